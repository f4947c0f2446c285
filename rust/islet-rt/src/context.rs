//! One interpreter's isolated state: namespace, module cache, config.

use crate::config::{ConfigError, InterpreterConfig};
use crate::engine::ops;
use crate::fault::{Fault, FaultKind};
use crate::modules::{self, ModuleInstance};
use crate::registry::InterpreterId;
use crate::values::Value;
use indexmap::IndexMap;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Live,
    Destroyed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub runs: u64,
    pub faults: u64,
    pub last_fault: Option<FaultKind>,
}

#[derive(Debug)]
struct Binding {
    value: Value,
    size: usize,
}

/// Insertion-ordered global scope with approximate memory accounting.
#[derive(Debug, Default)]
pub struct Namespace {
    entries: IndexMap<String, Binding>,
    footprint: usize,
    limit: Option<usize>,
}

impl Namespace {
    pub fn new(limit: Option<usize>) -> Self {
        Self { entries: IndexMap::new(), footprint: 0, limit }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|b| &b.value)
    }

    /// Mutable access for in-place updates; size changes go through [`adjust`](Self::adjust).
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.entries.get_mut(name).map(|b| &mut b.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Bind `name`, refusing the write when it would push the footprint past the limit.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), Fault> {
        let size = name.len() + value.approx_size();
        let old = self.entries.get(name).map(|b| b.size).unwrap_or(0);
        if size > old {
            self.reserve(size - old)?;
        }
        self.insert_sized(name, value, size);
        Ok(())
    }

    /// Bind without the limit check (used when restoring earlier state).
    pub fn set_unchecked(&mut self, name: &str, value: Value) {
        let size = name.len() + value.approx_size();
        self.insert_sized(name, value, size);
    }

    fn insert_sized(&mut self, name: &str, value: Value, size: usize) {
        match self.entries.get_mut(name) {
            Some(binding) => {
                self.footprint = self.footprint - binding.size + size;
                *binding = Binding { value, size };
            }
            None => {
                self.footprint += size;
                self.entries.insert(name.to_string(), Binding { value, size });
            }
        }
    }

    fn reserve(&self, extra: usize) -> Result<(), Fault> {
        match self.limit {
            Some(limit) if self.footprint.saturating_add(extra) > limit => Err(Fault::memory(format!(
                "namespace memory limit of {} bytes exceeded",
                limit
            ))),
            _ => Ok(()),
        }
    }

    /// Account for an in-place change of `name`'s value by `delta` bytes.
    ///
    /// Growth is checked against the limit before the caller applies it.
    pub fn adjust(&mut self, name: &str, delta: isize) -> Result<(), Fault> {
        if delta > 0 {
            self.reserve(delta as usize)?;
        }
        if let Some(binding) = self.entries.get_mut(name) {
            let new_size = (binding.size as isize).saturating_add(delta).max(0) as usize;
            self.footprint = self.footprint - binding.size + new_size;
            binding.size = new_size;
        }
        Ok(())
    }

    /// Recompute the charge for `name` from its current value.
    fn resize(&mut self, name: &str) {
        if let Some(binding) = self.entries.get_mut(name) {
            let size = name.len() + binding.value.approx_size();
            self.footprint = self.footprint - binding.size + size;
            binding.size = size;
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let binding = self.entries.shift_remove(name)?;
        self.footprint -= binding.size;
        Some(binding.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn footprint(&self) -> usize {
        self.footprint
    }

    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.entries.iter().map(|(k, b)| (k.clone(), b.value.clone())).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.footprint = 0;
    }
}

/// How to take back one global write made by the statement in flight.
///
/// Paths index into the global the record belongs to, the way `name[i][j]` does.
#[derive(Debug, Clone, PartialEq)]
pub enum Undo {
    /// Rebind the global to its earlier value, or unbind it.
    Rebind(Option<Value>),
    /// Put `prior` back at `path`.
    Replace { path: Vec<Value>, prior: Value },
    /// Cut the list at `path` back to `len` items.
    Truncate { path: Vec<Value>, len: usize },
    /// Put `value` back into the list at `path` at `index`.
    Insert { path: Vec<Value>, index: usize, value: Value },
    /// Drop `key` from the dict at `path`.
    Discard { path: Vec<Value>, key: Value },
}

impl Undo {
    /// Apply to the global's current value. A record that no longer fits is skipped.
    fn apply(self, root: &mut Value) {
        match self {
            Undo::Rebind(_) => {}
            Undo::Replace { path, prior } => {
                if let Some(target) = walk(root, &path) {
                    *target = prior;
                }
            }
            Undo::Truncate { path, len } => {
                if let Some(Value::List(items)) = walk(root, &path) {
                    items.truncate(len);
                }
            }
            Undo::Insert { path, index, value } => {
                if let Some(Value::List(items)) = walk(root, &path) {
                    if index <= items.len() {
                        items.insert(index, value);
                    }
                }
            }
            Undo::Discard { path, key } => {
                if let (Some(Value::Dict(map)), Ok(key)) = (walk(root, &path), ops::hash_key(&key)) {
                    map.shift_remove(&key);
                }
            }
        }
    }
}

fn walk<'v>(mut target: &'v mut Value, path: &[Value]) -> Option<&'v mut Value> {
    for index in path {
        target = ops::item_mut(target, index).ok()?;
    }
    Some(target)
}

/// Undo records for the statement in flight, oldest first.
#[derive(Debug, Default)]
struct Journal {
    entries: Vec<(String, Undo)>,
    /// Globals whose whole earlier value is already recorded.
    saved: HashSet<String>,
}

impl Journal {
    fn record(&mut self, name: &str, undo: Undo) {
        if self.saved.contains(name) {
            return;
        }
        if matches!(undo, Undo::Rebind(_)) {
            self.saved.insert(name.to_string());
        }
        self.entries.push((name.to_string(), undo));
    }
}

/// An interpreter's isolated execution environment.
#[derive(Debug)]
pub struct InterpreterContext {
    id: InterpreterId,
    config: InterpreterConfig,
    namespace: Namespace,
    modules: IndexMap<String, ModuleInstance>,
    state: ContextState,
    stats: RunStats,
    journal: Option<Journal>,
}

impl InterpreterContext {
    /// Build a fresh context with its baseline namespace.
    pub fn initialize(id: InterpreterId, config: InterpreterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let limit = config.resource_limits.max_memory_bytes.map(|b| b.min(usize::MAX as u64) as usize);
        let mut ctx = Self {
            id,
            config,
            namespace: Namespace::new(limit),
            modules: IndexMap::new(),
            state: ContextState::Live,
            stats: RunStats::default(),
            journal: None,
        };
        ctx.namespace.set_unchecked("__name__", Value::Str("__main__".into()));
        for name in ctx.config.baseline_modules.clone() {
            ctx.load_module(&name).map_err(|f| ConfigError::Invalid(f.message))?;
            ctx.namespace.set_unchecked(&name, Value::Module(name.clone()));
        }
        Ok(ctx)
    }

    /// Drop all state; later binds see `ContextDestroyed`.
    pub fn teardown(&mut self) {
        self.namespace.clear();
        self.modules.clear();
        self.journal = None;
        self.state = ContextState::Destroyed;
    }

    pub fn id(&self) -> InterpreterId {
        self.id
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == ContextState::Live
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn record_run(&mut self, fault: Option<FaultKind>) {
        self.stats.runs += 1;
        if fault.is_some() {
            self.stats.faults += 1;
            self.stats.last_fault = fault;
        }
    }

    // ── Globals ──

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.namespace.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), Fault> {
        self.journal_name(name);
        self.namespace.set(name, value)
    }

    /// Mutable access to a global; pair with [`adjust`](Self::adjust) for size changes.
    ///
    /// The whole value is journaled. Use [`get_mut_undoable`](Self::get_mut_undoable)
    /// when the change can be described more cheaply.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.journal_name(name);
        self.namespace.get_mut(name)
    }

    /// Mutable access to a global, journaling `undo` in place of a copy of its value.
    pub fn get_mut_undoable(&mut self, name: &str, undo: Undo) -> Option<&mut Value> {
        if self.namespace.contains(name) {
            if let Some(journal) = self.journal.as_mut() {
                journal.record(name, undo);
            }
        }
        self.namespace.get_mut(name)
    }

    pub fn adjust(&mut self, name: &str, delta: isize) -> Result<(), Fault> {
        self.namespace.adjust(name, delta)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.journal_name(name);
        self.namespace.remove(name)
    }

    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.namespace.snapshot()
    }

    // ── Statement journal ──

    /// Start recording writes for one atomic statement.
    pub fn begin_statement(&mut self) {
        self.journal = Some(Journal::default());
    }

    pub fn commit_statement(&mut self) {
        self.journal = None;
    }

    /// Whether a statement is being recorded.
    pub fn is_journaling(&self) -> bool {
        self.journal.is_some()
    }

    /// Undo every global write made since [`begin_statement`](Self::begin_statement).
    pub fn rollback_statement(&mut self) {
        let Some(journal) = self.journal.take() else { return };
        let mut touched = HashSet::new();
        for (name, undo) in journal.entries.into_iter().rev() {
            match undo {
                Undo::Rebind(Some(value)) => self.namespace.set_unchecked(&name, value),
                Undo::Rebind(None) => {
                    self.namespace.remove(&name);
                }
                undo => {
                    if let Some(value) = self.namespace.get_mut(&name) {
                        undo.apply(value);
                    }
                    touched.insert(name);
                }
            }
        }
        for name in touched {
            self.namespace.resize(&name);
        }
    }

    fn journal_name(&mut self, name: &str) {
        if let Some(journal) = self.journal.as_mut() {
            if !journal.saved.contains(name) {
                journal.record(name, Undo::Rebind(self.namespace.get(name).cloned()));
            }
        }
    }

    // ── Modules ──

    /// Load `name` into this context's module cache, instantiating it on first use.
    pub fn load_module(&mut self, name: &str) -> Result<(), Fault> {
        if self.modules.contains_key(name) {
            return Ok(());
        }
        if !modules::is_known(name) {
            return Err(Fault::new(FaultKind::ImportError, format!("No module named '{}'", name)));
        }
        if !self.config.is_module_allowed(name) {
            return Err(Fault::new(FaultKind::ImportError, format!("import of module '{}' is not allowed", name)));
        }
        let module = modules::instantiate(name, &self.config)
            .ok_or_else(|| Fault::new(FaultKind::ImportError, format!("No module named '{}'", name)))?;
        tracing::debug!("interpreter {} loaded module {}", self.id, name);
        self.modules.insert(name.to_string(), module);
        Ok(())
    }

    pub fn module(&self, name: &str) -> Option<&ModuleInstance> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut ModuleInstance> {
        self.modules.get_mut(name)
    }

    pub fn loaded_modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceLimits;

    fn ctx(config: InterpreterConfig) -> InterpreterContext {
        InterpreterContext::initialize(InterpreterId::new(1), config).unwrap()
    }

    #[test]
    fn test_initialize_baseline() {
        let c = ctx(InterpreterConfig::default().with_baseline_modules(["math"]));
        assert_eq!(c.get("__name__"), Some(&Value::Str("__main__".into())));
        assert_eq!(c.get("math"), Some(&Value::Module("math".into())));
        assert!(c.module("math").is_some());
        assert!(c.module("random").is_none());
    }

    #[test]
    fn test_rollback_restores_prior_values() {
        let mut c = ctx(InterpreterConfig::default());
        c.set("x", Value::Int(1)).unwrap();
        c.begin_statement();
        c.set("x", Value::Int(2)).unwrap();
        c.set("y", Value::Int(3)).unwrap();
        c.set("x", Value::Int(4)).unwrap();
        c.rollback_statement();
        assert_eq!(c.get("x"), Some(&Value::Int(1)));
        assert_eq!(c.get("y"), None);
    }

    #[test]
    fn test_in_place_undo_avoids_whole_copies() {
        let mut c = ctx(InterpreterConfig::default());
        c.set("xs", Value::from(vec![1i64, 2])).unwrap();
        c.begin_statement();
        if let Some(Value::List(items)) = c.get_mut_undoable("xs", Undo::Truncate { path: vec![], len: 2 }) {
            items.push(Value::Int(3));
        }
        let journal = c.journal.as_ref().unwrap();
        assert_eq!(journal.entries, vec![("xs".to_string(), Undo::Truncate { path: vec![], len: 2 })]);
        assert!(journal.saved.is_empty());

        c.set("xs", Value::Int(0)).unwrap();
        c.get_mut_undoable("xs", Undo::Truncate { path: vec![], len: 0 });
        assert_eq!(c.journal.as_ref().unwrap().entries.len(), 2);
        c.rollback_statement();
        assert_eq!(c.get("xs"), Some(&Value::from(vec![1i64, 2])));
        let baseline = ctx(InterpreterConfig::default()).namespace().footprint();
        assert_eq!(c.namespace().footprint(), baseline + "xs".len() + Value::from(vec![1i64, 2]).approx_size());
    }

    #[test]
    fn test_undo_records_nested_places() {
        let mut c = ctx(InterpreterConfig::default());
        let mut map = IndexMap::new();
        map.insert(crate::values::Key::Str("a".into()), Value::from(vec![1i64]));
        c.set("d", Value::Dict(map.clone())).unwrap();
        c.begin_statement();
        let path = vec![Value::from("a")];
        if let Some(Value::Dict(d)) = c.get_mut_undoable("d", Undo::Discard { path: vec![], key: Value::from("b") }) {
            d.insert(crate::values::Key::Str("b".into()), Value::Int(2));
        }
        if let Some(Value::Dict(d)) = c.get_mut_undoable("d", Undo::Insert { path, index: 0, value: Value::Int(1) }) {
            if let Some(Value::List(items)) = d.get_mut(&crate::values::Key::Str("a".into())) {
                items.remove(0);
            }
        }
        c.rollback_statement();
        assert_eq!(c.get("d"), Some(&Value::Dict(map)));
    }

    #[test]
    fn test_commit_keeps_writes() {
        let mut c = ctx(InterpreterConfig::default());
        c.begin_statement();
        c.set("x", Value::Int(2)).unwrap();
        c.commit_statement();
        c.rollback_statement();
        assert_eq!(c.get("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_memory_limit_refuses_write() {
        let limits = ResourceLimits::default().with_max_memory_bytes(1024);
        let mut c = ctx(InterpreterConfig::default().with_limits(limits));
        c.set("small", Value::Str("ok".into())).unwrap();
        let err = c.set("big", Value::Str("x".repeat(4096))).unwrap_err();
        assert_eq!(err.kind, FaultKind::MemoryError);
        assert!(c.get("big").is_none());
        assert!(c.namespace().footprint() <= 1024);
    }

    #[test]
    fn test_adjust_tracks_in_place_growth() {
        let limits = ResourceLimits::default().with_max_memory_bytes(2048);
        let mut c = ctx(InterpreterConfig::default().with_limits(limits));
        c.set("xs", Value::List(vec![])).unwrap();
        let before = c.namespace().footprint();
        c.adjust("xs", 100).unwrap();
        assert_eq!(c.namespace().footprint(), before + 100);
        assert!(c.adjust("xs", 10_000).is_err());
        c.adjust("xs", -100).unwrap();
        assert_eq!(c.namespace().footprint(), before);
    }

    #[test]
    fn test_disallowed_import() {
        let mut c = ctx(InterpreterConfig::default().with_allowed_modules(["math"]));
        assert!(c.load_module("math").is_ok());
        let err = c.load_module("random").unwrap_err();
        assert_eq!(err.kind, FaultKind::ImportError);
        let err = c.load_module("os").unwrap_err();
        assert!(err.message.contains("No module named"));
    }

    #[test]
    fn test_teardown() {
        let mut c = ctx(InterpreterConfig::default().with_baseline_modules(["random"]));
        c.teardown();
        assert_eq!(c.state(), ContextState::Destroyed);
        assert!(c.namespace().is_empty());
        assert_eq!(c.loaded_modules().count(), 0);
    }
}
