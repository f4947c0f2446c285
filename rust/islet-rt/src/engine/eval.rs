//! Statement execution and expression evaluation.

use super::builtins;
use super::methods;
use super::ops;
use super::{Args, Engine, Frame, Unwind};
use crate::context::Undo;
use crate::fault::{Fault, FaultKind};
use crate::values::{Builtin, FunctionValue, Value};
use indexmap::IndexMap;
use islet_compiler::compiler::ast::{
    AugAssignStmt, BinOp, CallArg, Expr, ForStmt, FunctionDef, IfStmt, RaiseStmt, Stmt, Target, WhileStmt,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Values a `for` loop walks. `range(...)` is produced lazily.
enum LoopIter {
    Range { next: Option<i64>, stop: i64, step: i64 },
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for LoopIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            LoopIter::Range { next, stop, step } => {
                let current = (*next)?;
                let more = if *step > 0 { current < *stop } else { current > *stop };
                if !more {
                    return None;
                }
                *next = current.checked_add(*step);
                Some(Value::Int(current))
            }
            LoopIter::Items(items) => items.next(),
        }
    }
}

impl<'a> Engine<'a> {
    pub(super) fn exec_block(&mut self, body: &[Stmt]) -> Result<(), Unwind> {
        for stmt in body {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<(), Unwind> {
        self.interrupt.check()?;
        let line = stmt.span().line;
        self.dispatch(stmt).map_err(|u| u.at_line(line))
    }

    /// Run `f` as one atomic unit of global writes.
    ///
    /// Only module-level work is journaled; inside a call the enclosing
    /// module-level statement already is.
    fn unit<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Unwind>) -> Result<T, Unwind> {
        if !self.frames.is_empty() {
            return f(self);
        }
        self.ctx.begin_statement();
        let out = f(self);
        match &out {
            Err(Unwind::Interrupted(_)) => self.ctx.rollback_statement(),
            _ => self.ctx.commit_statement(),
        }
        out
    }

    fn dispatch(&mut self, stmt: &Stmt) -> Result<(), Unwind> {
        match stmt {
            Stmt::Expr(s) => self.unit(|e| e.eval(&s.expr).map(drop)),
            Stmt::Assign(s) => self.unit(|e| {
                let value = e.eval(&s.value)?;
                let (last, rest) = match s.targets.split_last() {
                    Some(split) => split,
                    None => return Ok(()),
                };
                for target in rest {
                    e.assign(target, value.clone())?;
                }
                e.assign(last, value)
            }),
            Stmt::AugAssign(s) => self.unit(|e| e.aug_assign(s)),
            Stmt::If(s) => self.exec_if(s),
            Stmt::While(s) => self.exec_while(s),
            Stmt::For(s) => self.exec_for(s),
            Stmt::Def(def) => self.unit(|e| e.define(def)),
            Stmt::Return(s) => {
                let value = match &s.value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                Err(Unwind::Return(value))
            }
            Stmt::Break(_) => Err(Unwind::Break),
            Stmt::Continue(_) => Err(Unwind::Continue),
            Stmt::Pass(_) | Stmt::Global(_) => Ok(()),
            Stmt::Import(s) => self.unit(|e| {
                for (module, alias) in &s.names {
                    e.ctx.load_module(module)?;
                    e.bind(alias.as_deref().unwrap_or(module.as_str()), Value::Module(module.clone()))?;
                }
                Ok(())
            }),
            Stmt::FromImport(s) => self.unit(|e| {
                e.ctx.load_module(&s.module)?;
                for (name, alias) in &s.names {
                    let value = e.ctx.module(&s.module).and_then(|m| m.attr(name)).ok_or_else(|| {
                        Fault::new(FaultKind::ImportError, format!("cannot import name '{}' from '{}'", name, s.module))
                    })?;
                    e.bind(alias.as_deref().unwrap_or(name.as_str()), value)?;
                }
                Ok(())
            }),
            Stmt::Raise(s) => self.unit(|e| e.raise(s)),
        }
    }

    fn exec_if(&mut self, s: &IfStmt) -> Result<(), Unwind> {
        for (condition, body) in &s.branches {
            if self.unit(|e| e.eval(condition))?.is_truthy() {
                return self.exec_block(body);
            }
        }
        match &s.else_body {
            Some(body) => self.exec_block(body),
            None => Ok(()),
        }
    }

    fn exec_while(&mut self, s: &WhileStmt) -> Result<(), Unwind> {
        loop {
            self.interrupt.check()?;
            if !self.unit(|e| e.eval(&s.condition))?.is_truthy() {
                return Ok(());
            }
            match self.exec_block(&s.body) {
                Ok(()) | Err(Unwind::Continue) => {}
                Err(Unwind::Break) => return Ok(()),
                Err(other) => return Err(other),
            }
        }
    }

    fn exec_for(&mut self, s: &ForStmt) -> Result<(), Unwind> {
        let items = self.unit(|e| e.loop_iter(&s.iter))?;
        for item in items {
            self.interrupt.check()?;
            self.unit(|e| e.bind(&s.var, item))?;
            match self.exec_block(&s.body) {
                Ok(()) | Err(Unwind::Continue) => {}
                Err(Unwind::Break) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn loop_iter(&mut self, expr: &Expr) -> Result<LoopIter, Unwind> {
        if let Expr::Call(callee, args, _) = expr {
            let is_range = matches!(callee.as_ref(), Expr::Ident(name, _) if name == "range");
            if is_range
                && self.lookup_ref("range").is_none()
                && args.iter().all(|a| matches!(a, CallArg::Positional(_)))
            {
                let args = self.eval_args(args)?;
                let (start, stop, step) = builtins::range_bounds(&args)?;
                return Ok(LoopIter::Range { next: Some(start), stop, step });
            }
        }
        let items = match self.eval(expr)? {
            Value::List(items) => items,
            other => ops::iterate(&other)?,
        };
        Ok(LoopIter::Items(items.into_iter()))
    }

    fn define(&mut self, def: &Arc<FunctionDef>) -> Result<(), Unwind> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        let mut globals = HashSet::new();
        declared_globals(&def.body, &mut globals);
        let func = FunctionValue { def: Arc::clone(def), defaults, globals: Arc::new(globals) };
        self.bind(&def.name, Value::Function(Arc::new(func)))
    }

    /// `raise Kind(msg)`, `raise Kind`, `raise "msg"` or a bare `raise`.
    fn raise(&mut self, s: &RaiseStmt) -> Result<(), Unwind> {
        let Some(expr) = &s.value else {
            return Err(Fault::new(FaultKind::Exception, "No active exception to reraise").into());
        };
        let (name, call_args) = match expr {
            Expr::Ident(name, _) => (Some(name), None),
            Expr::Call(callee, args, _) => match callee.as_ref() {
                Expr::Ident(name, _) => (Some(name), Some(args)),
                _ => (None, None),
            },
            _ => (None, None),
        };
        if let Some(name) = name {
            if let Some(kind) = FaultKind::raisable(name).filter(|_| self.lookup_ref(name).is_none()) {
                let message = match call_args {
                    Some(args) => {
                        let args = self.eval_args(args)?;
                        args.get(0).map(Value::display_pretty).unwrap_or_default()
                    }
                    None => String::new(),
                };
                return Err(Fault::new(kind, message).into());
            }
        }
        match self.eval(expr)? {
            Value::Str(message) => Err(Fault::new(FaultKind::Exception, message).into()),
            _ => Err(Fault::type_error("exceptions must derive from BaseException").into()),
        }
    }

    // ── Names ──

    fn lookup_ref(&self, name: &str) -> Option<&Value> {
        if let Some(frame) = self.frames.last() {
            if !frame.globals.contains(name) {
                if let Some(value) = frame.locals.get(name) {
                    return Some(value);
                }
            }
        }
        self.ctx.get(name)
    }

    fn lookup(&self, name: &str) -> Result<Value, Fault> {
        match self.lookup_ref(name) {
            Some(value) => Ok(value.clone()),
            None => builtins::lookup(name).map(Value::Builtin).ok_or_else(|| Fault::name_error(name)),
        }
    }

    /// Fault for a place rooted at a name with no binding.
    fn unbound(&self, name: &str) -> Fault {
        match builtins::lookup(name) {
            Some(_) => Fault::type_error("'builtin_function_or_method' object is not subscriptable"),
            None => Fault::name_error(name),
        }
    }

    fn bind(&mut self, name: &str, value: Value) -> Result<(), Unwind> {
        self.check_value_size(&value)?;
        self.check_nesting(&value, 0)?;
        let limit = self.value_limit;
        match self.frames.last_mut() {
            Some(frame) if !frame.globals.contains(name) => {
                let size = value.approx_size();
                let old = frame.locals.get(name).map(Value::approx_size).unwrap_or(0);
                let next = frame.footprint.saturating_add(size).saturating_sub(old);
                if limit.is_some_and(|l| next > l) {
                    return Err(Fault::memory("function locals exceed memory limit").into());
                }
                frame.footprint = next;
                frame.locals.insert(name.to_string(), value);
                Ok(())
            }
            _ => Ok(self.ctx.set(name, value)?),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.frames.last().is_some_and(|f| !f.globals.contains(name) && f.locals.contains_key(name))
    }

    // ── Places: `name[i][j]` ──

    /// Split an index chain into its root name and evaluated indices.
    fn place_path<'e>(&mut self, expr: &'e Expr) -> Result<(&'e str, Vec<Value>), Unwind> {
        match expr {
            Expr::Ident(name, _) => Ok((name, Vec::new())),
            Expr::Index(base, index, _) => {
                let (root, mut path) = self.place_path(base)?;
                path.push(self.eval(index)?);
                Ok((root, path))
            }
            other => Err(Fault::new(FaultKind::InternalError, format!("not a place: {:?}", other.span())).into()),
        }
    }

    fn place_ref(&self, root: &str, path: &[Value]) -> Result<&Value, Fault> {
        let mut current = self.lookup_ref(root).ok_or_else(|| self.unbound(root))?;
        for index in path {
            current = ops::item_ref(current, index)?;
        }
        Ok(current)
    }

    /// Mutable access to a place; a global root is journaled with `undo`.
    fn place_mut(&mut self, root: &str, path: &[Value], undo: Option<Undo>) -> Result<&mut Value, Fault> {
        let base = if self.is_local(root) {
            self.frames.last_mut().and_then(|f| f.locals.get_mut(root))
        } else {
            match undo {
                Some(undo) => self.ctx.get_mut_undoable(root, undo),
                None => self.ctx.get_mut(root),
            }
        };
        let mut current = base.ok_or_else(|| Fault::name_error(root))?;
        for index in path {
            current = ops::item_mut(current, index)?;
        }
        Ok(current)
    }

    /// Whether a write under `root` goes into the statement journal.
    fn journaled(&self, root: &str) -> bool {
        self.ctx.is_journaling() && !self.is_local(root)
    }

    /// Undo record for `container[key] = ...` on the place at `path`.
    fn item_undo(&self, root: &str, path: &[Value], key: &Value) -> Result<Option<Undo>, Fault> {
        if !self.journaled(root) {
            return Ok(None);
        }
        let container = self.place_ref(root, path)?;
        let mut path = path.to_vec();
        Ok(Some(match ops::item_ref(container, key) {
            Ok(prior) => {
                let prior = prior.clone();
                path.push(key.clone());
                Undo::Replace { path, prior }
            }
            Err(_) => Undo::Discard { path, key: key.clone() },
        }))
    }

    /// Undo record for a mutating method call on the place at `path`.
    fn method_undo(&self, root: &str, path: &[Value], method: &str, args: &Args) -> Result<Option<Undo>, Fault> {
        if !self.journaled(root) {
            return Ok(None);
        }
        let target = self.place_ref(root, path)?;
        let path = path.to_vec();
        let undo = match (target, method) {
            (Value::List(items), "append" | "extend") => Undo::Truncate { path, len: items.len() },
            (Value::List(items), "pop") => {
                let at = match args.positional.first() {
                    Some(index) => index.as_int().and_then(|i| ops::normalize_index(i, items.len())),
                    None => items.len().checked_sub(1),
                };
                match at {
                    Some(index) => Undo::Insert { path, index, value: items[index].clone() },
                    None => Undo::Truncate { path, len: items.len() },
                }
            }
            (Value::Dict(_), "setdefault") => match args.positional.first() {
                Some(key) => return self.item_undo(root, &path, key),
                None => Undo::Replace { path, prior: target.clone() },
            },
            _ => Undo::Replace { path, prior: target.clone() },
        };
        Ok(Some(undo))
    }

    /// Charge an in-place size change to whichever scope owns `root`.
    fn account(&mut self, root: &str, delta: isize) -> Result<(), Fault> {
        if delta == 0 {
            return Ok(());
        }
        if !self.is_local(root) {
            return self.ctx.adjust(root, delta);
        }
        let limit = self.value_limit;
        if let Some(frame) = self.frames.last_mut() {
            let next = frame.footprint.saturating_add_signed(delta);
            if delta > 0 && limit.is_some_and(|l| next > l) {
                return Err(Fault::memory("function locals exceed memory limit"));
            }
            frame.footprint = next;
        }
        Ok(())
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), Unwind> {
        match target {
            Target::Name(name, _) => self.bind(name, value),
            Target::Index(base, index, _) => {
                let (root, path) = self.place_path(base)?;
                let key = self.eval(index)?;
                self.store_item(root, &path, key, value)
            }
        }
    }

    fn store_item(&mut self, root: &str, path: &[Value], key: Value, value: Value) -> Result<(), Unwind> {
        self.check_value_size(&value)?;
        self.check_nesting(&value, path.len() + 1)?;
        let delta = ops::setitem_delta(self.place_ref(root, path)?, &key, &value)?;
        let undo = self.item_undo(root, path, &key)?;
        self.account(root, delta)?;
        let result = self.place_mut(root, path, undo).and_then(|container| ops::set_item(container, key, value));
        if result.is_err() {
            self.account(root, -delta)?;
        }
        Ok(result?)
    }

    fn aug_assign(&mut self, s: &AugAssignStmt) -> Result<(), Unwind> {
        match &s.target {
            Target::Name(name, _) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(&s.value)?;
                let value = self.binary(s.op, current, rhs)?;
                self.bind(name, value)
            }
            Target::Index(base, index, _) => {
                let (root, path) = self.place_path(base)?;
                let key = self.eval(index)?;
                let current = ops::index_value(self.place_ref(root, &path)?, &key)?;
                let rhs = self.eval(&s.value)?;
                let value = self.binary(s.op, current, rhs)?;
                self.store_item(root, &path, key, value)
            }
        }
    }

    // ── Expressions ──

    pub(super) fn eval(&mut self, expr: &Expr) -> Result<Value, Unwind> {
        match expr {
            Expr::IntLit(n, _) => Ok(Value::Int(*n)),
            Expr::FloatLit(f, _) => Ok(Value::Float(*f)),
            Expr::StringLit(s, _) => Ok(Value::Str(s.clone())),
            Expr::BoolLit(b, _) => Ok(Value::Bool(*b)),
            Expr::NoneLit(_) => Ok(Value::None),
            Expr::Ident(name, _) => Ok(self.lookup(name)?),
            Expr::ListLit(items, _) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                let list = Value::List(out);
                self.check_value_size(&list)?;
                self.check_nesting(&list, 0)?;
                Ok(list)
            }
            Expr::DictLit(pairs, _) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = ops::hash_key(&self.eval(k)?)?;
                    let value = self.eval(v)?;
                    map.insert(key, value);
                }
                let dict = Value::Dict(map);
                self.check_value_size(&dict)?;
                self.check_nesting(&dict, 0)?;
                Ok(dict)
            }
            Expr::BinOp(lhs, BinOp::And, rhs, _) => {
                let left = self.eval(lhs)?;
                if left.is_truthy() { self.eval(rhs) } else { Ok(left) }
            }
            Expr::BinOp(lhs, BinOp::Or, rhs, _) => {
                let left = self.eval(lhs)?;
                if left.is_truthy() { Ok(left) } else { self.eval(rhs) }
            }
            Expr::BinOp(lhs, op, rhs, _) => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                Ok(self.binary(*op, left, right)?)
            }
            Expr::UnaryOp(op, operand, _) => {
                let value = self.eval(operand)?;
                Ok(ops::unary(*op, value)?)
            }
            Expr::IfExpr(condition, body, orelse, _) => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Call(callee, args, _) => self.eval_call(callee, args),
            Expr::Attribute(base, name, _) => match self.eval(base)? {
                Value::Module(module) => Ok(self.module_attr(&module, name)?),
                other if methods::has_method(&other, name) => Err(Fault::type_error(format!(
                    "method '{}' of '{}' object must be called",
                    name,
                    other.type_name()
                ))
                .into()),
                other => Err(Fault::attribute_error(other.type_name(), name).into()),
            },
            Expr::Index(base, index, _) => {
                if let Some(root) = base.root_name().filter(|r| self.lookup_ref(r).is_some()) {
                    let (_, path) = self.place_path(base)?;
                    let key = self.eval(index)?;
                    return Ok(ops::index_value(self.place_ref(root, &path)?, &key)?);
                }
                let container = self.eval(base)?;
                let key = self.eval(index)?;
                Ok(ops::index_value(&container, &key)?)
            }
        }
    }

    /// Binary operator with a size guard on sequence growth.
    fn binary(&self, op: BinOp, left: Value, right: Value) -> Result<Value, Fault> {
        if let Some(limit) = self.value_limit {
            let projected = match op {
                BinOp::Mul => ops::repeat_size(&left, &right),
                BinOp::Add if matches!((&left, &right), (Value::Str(_), Value::Str(_)) | (Value::List(_), Value::List(_))) => {
                    Some(left.approx_size().saturating_add(right.approx_size()))
                }
                _ => None,
            };
            if projected.is_some_and(|size| size > limit) {
                return Err(Fault::memory(format!("value exceeds memory limit of {} bytes", limit)));
            }
        }
        ops::binary(op, left, right)
    }

    fn eval_args(&mut self, args: &[CallArg]) -> Result<Args, Unwind> {
        let mut out = Args::default();
        for arg in args {
            match arg {
                CallArg::Positional(expr) => out.positional.push(self.eval(expr)?),
                CallArg::Keyword(name, expr, _) => {
                    let value = self.eval(expr)?;
                    if out.keywords.iter().any(|(k, _)| k == name) {
                        return Err(Fault::type_error(format!("keyword argument repeated: {}", name)).into());
                    }
                    out.keywords.push((name.clone(), value));
                }
            }
        }
        Ok(out)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[CallArg]) -> Result<Value, Unwind> {
        if let Expr::Attribute(base, method, _) = callee {
            return self.call_method(base, method, args);
        }
        let func = self.eval(callee)?;
        let args = self.eval_args(args)?;
        self.call_value(func, args)
    }

    fn call_method(&mut self, base: &Expr, method: &str, args: &[CallArg]) -> Result<Value, Unwind> {
        let Some(root) = base.root_name().filter(|r| self.lookup_ref(r).is_some()) else {
            let receiver = self.eval(base)?;
            let args = self.eval_args(args)?;
            return match receiver {
                Value::Module(module) => {
                    let func = self.module_attr(&module, method)?;
                    self.call_value(func, args)
                }
                mut other if methods::is_mutating(&other, method) => {
                    methods::mutation_delta(&other, method, &args)?;
                    Ok(methods::call_mutating(&mut other, method, args)?)
                }
                other => Ok(methods::call_pure(&other, method, args)?),
            };
        };
        let (_, path) = self.place_path(base)?;
        let args = self.eval_args(args)?;
        let receiver = self.place_ref(root, &path)?;
        if let Value::Module(module) = receiver {
            let module = module.clone();
            let func = self.module_attr(&module, method)?;
            return self.call_value(func, args);
        }
        if !methods::is_mutating(receiver, method) {
            return Ok(methods::call_pure(receiver, method, args)?);
        }
        let delta = methods::mutation_delta(receiver, method, &args)?;
        for arg in args.positional.iter().chain(args.keywords.iter().map(|(_, v)| v)) {
            self.check_nesting(arg, path.len() + 1)?;
        }
        let undo = self.method_undo(root, &path, method, &args)?;
        self.account(root, delta)?;
        let result = self.place_mut(root, &path, undo).and_then(|target| methods::call_mutating(target, method, args));
        if result.is_err() {
            self.account(root, -delta)?;
        }
        Ok(result?)
    }

    fn module_attr(&self, module: &str, name: &str) -> Result<Value, Fault> {
        self.ctx.module(module).and_then(|m| m.attr(name)).ok_or_else(|| {
            Fault::new(FaultKind::AttributeError, format!("module '{}' has no attribute '{}'", module, name))
        })
    }

    pub(super) fn call_value(&mut self, callee: Value, args: Args) -> Result<Value, Unwind> {
        match callee {
            Value::Function(func) => self.call_function(&func, args),
            Value::Builtin(Builtin::Global(name)) => self.call_builtin(name, args),
            Value::Builtin(Builtin::Module(module, name)) => {
                let instance = self.ctx.module_mut(module).ok_or_else(|| {
                    Fault::new(FaultKind::ImportError, format!("module '{}' is not loaded", module))
                })?;
                instance.call(name, args, &self.interrupt)
            }
            other => Err(Fault::type_error(format!("'{}' object is not callable", other.type_name())).into()),
        }
    }

    fn call_function(&mut self, func: &FunctionValue, args: Args) -> Result<Value, Unwind> {
        self.interrupt.check()?;
        if self.frames.len() >= self.max_depth {
            return Err(Fault::new(FaultKind::RecursionError, "maximum recursion depth exceeded").into());
        }
        let locals = bind_params(func, args)?;
        let footprint = locals.values().map(Value::approx_size).sum();
        self.frames.push(Frame { locals, globals: Arc::clone(&func.globals), footprint });
        let outcome = self.exec_block(&func.def.body);
        self.frames.pop();
        match outcome {
            Ok(()) => Ok(Value::None),
            Err(Unwind::Return(value)) => Ok(value),
            Err(other) => Err(other),
        }
    }
}

/// Names a function body declares `global`, excluding nested defs.
fn declared_globals(body: &[Stmt], out: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Global(g) => out.extend(g.names.iter().cloned()),
            Stmt::If(s) => {
                for (_, block) in &s.branches {
                    declared_globals(block, out);
                }
                if let Some(block) = &s.else_body {
                    declared_globals(block, out);
                }
            }
            Stmt::While(s) => declared_globals(&s.body, out),
            Stmt::For(s) => declared_globals(&s.body, out),
            _ => {}
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Match call arguments to parameters, filling defaults.
fn bind_params(func: &FunctionValue, args: Args) -> Result<HashMap<String, Value>, Fault> {
    let def = &func.def;
    let params = &def.params;
    let given = args.positional.len();
    if given > params.len() {
        return Err(Fault::type_error(format!(
            "{}() takes {} positional argument{} but {} {} given",
            def.name,
            params.len(),
            plural(params.len()),
            given,
            if given == 1 { "was" } else { "were" }
        )));
    }
    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, value) in slots.iter_mut().zip(args.positional) {
        *slot = Some(value);
    }
    for (name, value) in args.keywords {
        let Some(i) = params.iter().position(|p| p.name == name) else {
            return Err(Fault::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                def.name, name
            )));
        };
        if slots[i].is_some() {
            return Err(Fault::type_error(format!("{}() got multiple values for argument '{}'", def.name, name)));
        }
        slots[i] = Some(value);
    }
    let mut locals = HashMap::with_capacity(params.len());
    let mut missing = Vec::new();
    for ((param, slot), default) in params.iter().zip(slots).zip(&func.defaults) {
        match slot.or_else(|| default.clone()) {
            Some(value) => {
                locals.insert(param.name.clone(), value);
            }
            None => missing.push(format!("'{}'", param.name)),
        }
    }
    if let Some((last, init)) = missing.split_last() {
        let names = if init.is_empty() { last.clone() } else { format!("{} and {}", init.join(", "), last) };
        return Err(Fault::type_error(format!(
            "{}() missing {} required positional argument{}: {}",
            def.name,
            missing.len(),
            plural(missing.len()),
            names
        )));
    }
    Ok(locals)
}
