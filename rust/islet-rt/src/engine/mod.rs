//! Execution engine: runs a compiled program to completion inside one context.
//!
//! The engine owns no global state. Everything a run touches lives in the
//! [`InterpreterContext`] it was handed, and everything it produces comes
//! back as an [`ExecutionResult`].

mod builtins;
mod eval;
pub mod methods;
pub mod ops;

use crate::context::InterpreterContext;
use crate::fault::{Fault, FaultKind};
use crate::result::ExecutionResult;
use crate::services::interrupt::{Interrupt, Interruption};
use crate::values::{Value, MAX_NESTING_DEPTH};
use islet_compiler::compiler::ast::Program;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use builtins::{is_builtin, BUILTINS};

/// Non-local exits threaded through statement execution.
#[derive(Debug)]
pub enum Unwind {
    Fault(Fault),
    Interrupted(Interruption),
    Return(Value),
    Break,
    Continue,
}

impl Unwind {
    fn at_line(self, line: usize) -> Self {
        match self {
            Unwind::Fault(f) => Unwind::Fault(f.at_line(line)),
            other => other,
        }
    }
}

impl From<Fault> for Unwind {
    fn from(f: Fault) -> Self {
        Unwind::Fault(f)
    }
}

impl From<Interruption> for Unwind {
    fn from(i: Interruption) -> Self {
        Unwind::Interrupted(i)
    }
}

/// Evaluated call arguments.
#[derive(Debug, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Self { positional, keywords: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Remove and return a keyword argument.
    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let pos = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(pos).1)
    }

    /// Check the positional count and that no unconsumed keywords remain.
    pub fn expect(&self, func: &str, min: usize, max: usize) -> Result<(), Fault> {
        if let Some((k, _)) = self.keywords.first() {
            return Err(Fault::type_error(format!("{}() got an unexpected keyword argument '{}'", func, k)));
        }
        let n = self.positional.len();
        if n < min || n > max {
            let expected = match (min, max) {
                (a, b) if a == b => format!("exactly {}", a),
                (a, usize::MAX) => format!("at least {}", a),
                (0, b) => format!("at most {}", b),
                (a, b) => format!("from {} to {}", a, b),
            };
            let noun = if max == 1 { "argument" } else { "arguments" };
            return Err(Fault::type_error(format!("{}() takes {} {} ({} given)", func, expected, noun, n)));
        }
        Ok(())
    }

    pub fn int(&self, index: usize, func: &str) -> Result<i64, Fault> {
        match self.positional.get(index) {
            Some(Value::Int(n)) => Ok(*n),
            Some(Value::Bool(b)) => Ok(*b as i64),
            Some(other) => Err(Fault::type_error(format!(
                "{}() argument must be int, not {}",
                func,
                other.type_name()
            ))),
            None => Err(Fault::type_error(format!("{}() missing required argument", func))),
        }
    }

    pub fn float(&self, index: usize, func: &str) -> Result<f64, Fault> {
        match self.positional.get(index) {
            Some(v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => Ok(v.as_float().unwrap_or_default()),
            Some(other) => Err(Fault::type_error(format!(
                "{}() argument must be a number, not {}",
                func,
                other.type_name()
            ))),
            None => Err(Fault::type_error(format!("{}() missing required argument", func))),
        }
    }

    pub fn str(&self, index: usize, func: &str) -> Result<&str, Fault> {
        match self.positional.get(index) {
            Some(Value::Str(s)) => Ok(s),
            Some(other) => Err(Fault::type_error(format!(
                "{}() argument must be str, not {}",
                func,
                other.type_name()
            ))),
            None => Err(Fault::type_error(format!("{}() missing required argument", func))),
        }
    }
}

/// Function-local scope.
#[derive(Debug, Default)]
struct Frame {
    locals: HashMap<String, Value>,
    /// Names declared `global` in the running function.
    globals: Arc<HashSet<String>>,
    /// Approximate bytes held by `locals`.
    footprint: usize,
}

pub struct Engine<'a> {
    ctx: &'a mut InterpreterContext,
    interrupt: Interrupt,
    output: String,
    max_output: Option<usize>,
    max_depth: usize,
    /// Largest single value an expression may build.
    value_limit: Option<usize>,
    frames: Vec<Frame>,
}

impl<'a> Engine<'a> {
    pub fn new(ctx: &'a mut InterpreterContext, interrupt: Interrupt) -> Self {
        let limits = &ctx.config().resource_limits;
        let max_output = limits.max_output_bytes.map(clamp_usize);
        let value_limit = limits.max_memory_bytes.map(clamp_usize);
        let max_depth = limits.max_call_depth;
        Self { ctx, interrupt, output: String::new(), max_output, max_depth, value_limit, frames: Vec::new() }
    }

    /// Run every module-level statement in order.
    pub fn run(&mut self, program: &Program) -> Result<(), Unwind> {
        self.exec_block(&program.body)
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_output(self) -> String {
        self.output
    }

    fn write_output(&mut self, text: &str) -> Result<(), Fault> {
        if let Some(max) = self.max_output {
            if self.output.len() + text.len() > max {
                return Err(Fault::memory(format!("output limit of {} bytes exceeded", max)));
            }
        }
        self.output.push_str(text);
        Ok(())
    }

    /// Refuse `value` when stored `level` containers deep would nest too far.
    fn check_nesting(&self, value: &Value, level: usize) -> Result<(), Fault> {
        if level + value.depth() > MAX_NESTING_DEPTH {
            return Err(Fault::new(
                FaultKind::RecursionError,
                format!("maximum container nesting depth of {} exceeded", MAX_NESTING_DEPTH),
            ));
        }
        Ok(())
    }

    fn check_value_size(&self, value: &Value) -> Result<(), Fault> {
        match self.value_limit {
            Some(limit) if value.approx_size() > limit => {
                Err(Fault::memory(format!("value exceeds memory limit of {} bytes", limit)))
            }
            _ => Ok(()),
        }
    }
}

fn clamp_usize(n: u64) -> usize {
    n.min(usize::MAX as u64) as usize
}

/// Execute `program` in `ctx` and fold the outcome into an [`ExecutionResult`].
///
/// Faults keep the writes made before them; interruptions roll back the
/// statement in flight.
pub fn execute(ctx: &mut InterpreterContext, program: &Program, interrupt: Interrupt) -> ExecutionResult {
    let mut engine = Engine::new(ctx, interrupt);
    let outcome = engine.run(program);
    let output = engine.into_output();
    match outcome {
        Ok(()) => {
            ctx.record_run(None);
            ExecutionResult::ok(output)
        }
        Err(Unwind::Fault(fault)) => {
            ctx.commit_statement();
            ctx.record_run(Some(fault.kind));
            ExecutionResult::fault(fault, output)
        }
        Err(Unwind::Interrupted(reason)) => {
            ctx.rollback_statement();
            ctx.record_run(None);
            ExecutionResult::interrupted(reason, output)
        }
        Err(other) => {
            ctx.commit_statement();
            ctx.record_run(Some(FaultKind::InternalError));
            let fault = Fault::new(FaultKind::InternalError, format!("unexpected control flow: {:?}", other));
            ExecutionResult::fault(fault, output)
        }
    }
}
