//! Caller-facing API: [`Runtime`], [`Handle`] and [`create_interpreter`].
//!
//! A `Handle` refers to its interpreter by id. Every call goes back through
//! the registry, so a handle whose interpreter was closed (through any
//! clone) reports `UnknownInterpreter` instead of touching stale state.

use crate::config::{BusyPolicy, InterpreterConfig, RuntimeConfig};
use crate::context::RunStats;
use crate::engine;
use crate::error::RuntimeError;
use crate::fault::{Fault, FaultKind};
use crate::registry::{ContextSlot, InterpreterId, Registry};
use crate::result::{ErrorKind, ExecutionResult};
use crate::services::interrupt::{CancelToken, Interrupt};
use crate::services::panic_boundary::with_panic_boundary;
use crate::values::{Value, MAX_NESTING_DEPTH};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-call options for [`Handle::run_code_with`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides the interpreter's `default_timeout_ms`.
    pub timeout: Option<Duration>,
    /// Token the host may cancel from another thread.
    pub cancel: Option<CancelToken>,
}

impl RunOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Owns an interpreter registry.
#[derive(Debug)]
pub struct Runtime {
    registry: Arc<Registry>,
    config: RuntimeConfig,
}

static GLOBAL: Lazy<Runtime> = Lazy::new(|| Runtime::new(RuntimeConfig::default()));

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { registry: Arc::new(Registry::new(config.max_interpreters)), config }
    }

    /// The lazily created process-wide runtime.
    pub fn global() -> &'static Runtime {
        &GLOBAL
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Create an interpreter; `None` uses the runtime's default interpreter config.
    pub fn create_interpreter(&self, config: Option<InterpreterConfig>) -> Result<Handle, RuntimeError> {
        let config = config.unwrap_or_else(|| self.config.interpreter.clone());
        let (id, _) = self.registry.create(config)?;
        Ok(Handle {
            inner: Arc::new(HandleInner { id, registry: Arc::clone(&self.registry), closed: AtomicBool::new(false) }),
        })
    }

    pub fn interpreter_count(&self) -> usize {
        self.registry.len()
    }

    pub fn interpreter_ids(&self) -> Vec<InterpreterId> {
        self.registry.ids()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

/// Create an interpreter in the process-wide runtime.
pub fn create_interpreter(config: Option<InterpreterConfig>) -> Result<Handle, RuntimeError> {
    Runtime::global().create_interpreter(config)
}

#[derive(Debug)]
struct HandleInner {
    id: InterpreterId,
    registry: Arc<Registry>,
    closed: AtomicBool,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.registry.destroy(self.id) {
            Ok(()) | Err(RuntimeError::UnknownInterpreter(_)) => {}
            Err(e) => warn!("failed to close interpreter {} on drop: {}", self.id, e),
        }
    }
}

/// Caller-facing reference to one interpreter. Clones share the interpreter;
/// dropping the last clone closes it.
#[derive(Debug, Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    pub fn id(&self) -> InterpreterId {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst) || self.inner.registry.lookup(self.inner.id).is_err()
    }

    pub fn run_code(&self, source: &str) -> ExecutionResult {
        self.run_code_with(source, RunOptions::default())
    }

    /// Compile and run `source` in this interpreter. Never panics; every
    /// failure is reported in the returned result.
    pub fn run_code_with(&self, source: &str, options: RunOptions) -> ExecutionResult {
        let started = Instant::now();
        let id = self.inner.id;
        let slot = match self.slot() {
            Ok(slot) => slot,
            Err(e) => return e.into(),
        };

        let source = unindent::unindent(source);
        let program = match islet_compiler::compile(&source) {
            Ok(program) => program,
            Err(e) => {
                debug!("interpreter {} rejected source: {}", id, e);
                return ExecutionResult::compile_error(&e);
            }
        };

        let deadline = options.timeout.or(slot.default_timeout()).and_then(|t| started.checked_add(t));
        let wait = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let mut ctx = match slot.bind(slot.busy_policy(), wait) {
            Ok(guard) => guard,
            Err(e) => return e.into(),
        };

        let cancel = options.cancel.unwrap_or_default();
        slot.set_active(Some(cancel.clone()));
        let max_instructions = ctx.config().resource_limits.max_instructions;
        let interrupt = Interrupt::new(deadline, cancel, slot.closing_flag()).with_max_instructions(max_instructions);
        let outcome = with_panic_boundary(AssertUnwindSafe(|| engine::execute(&mut ctx, &program, interrupt)));
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                ctx.rollback_statement();
                ctx.record_run(Some(FaultKind::InternalError));
                ExecutionResult::fault(Fault::new(FaultKind::InternalError, panic.message()), String::new())
            }
        };
        slot.set_active(None);
        drop(ctx);

        let elapsed = started.elapsed();
        match result.error_kind() {
            Some(ErrorKind::Timeout) => warn!("interpreter {} timed out after {:?}", id, elapsed),
            _ => debug!("interpreter {} ran in {:?}", id, elapsed),
        }
        result
    }

    /// Close the interpreter. A second close reports `UnknownInterpreter`.
    pub fn close(&self) -> Result<(), RuntimeError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.registry.destroy(self.inner.id)
    }

    /// Cancel the run in flight, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        self.slot().map(|slot| slot.cancel_active()).unwrap_or(false)
    }

    /// Deep copy of the global namespace. Waits for a run in flight to finish.
    pub fn namespace_snapshot(&self) -> Result<IndexMap<String, Value>, RuntimeError> {
        let slot = self.slot()?;
        let ctx = slot.bind(BusyPolicy::Block, None)?;
        Ok(ctx.snapshot())
    }

    pub fn get_global(&self, name: &str) -> Result<Option<Value>, RuntimeError> {
        let slot = self.slot()?;
        let ctx = slot.bind(BusyPolicy::Block, None)?;
        Ok(ctx.get(name).cloned())
    }

    /// Bind a plain data value as a global, as if assigned by code.
    pub fn set_global(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if !is_identifier(name) {
            return Err(RuntimeError::InvalidValue(format!("'{}' is not a valid name", name)));
        }
        if value.depth() > MAX_NESTING_DEPTH {
            return Err(RuntimeError::InvalidValue(format!("value nests deeper than {} levels", MAX_NESTING_DEPTH)));
        }
        if !value.is_data() {
            return Err(RuntimeError::InvalidValue(format!("cannot bind a {} value from the host", value.type_name())));
        }
        let slot = self.slot()?;
        let mut ctx = slot.bind(BusyPolicy::Block, None)?;
        ctx.set(name, value).map_err(|fault| RuntimeError::ResourceExhausted(fault.message))
    }

    pub fn stats(&self) -> Result<RunStats, RuntimeError> {
        let slot = self.slot()?;
        let ctx = slot.bind(BusyPolicy::Block, None)?;
        Ok(ctx.stats().clone())
    }

    fn slot(&self) -> Result<Arc<ContextSlot>, RuntimeError> {
        self.inner.registry.lookup(self.inner.id)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_') && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_close() {
        let rt = Runtime::default();
        let h = rt.create_interpreter(None).unwrap();
        assert_eq!(rt.interpreter_count(), 1);
        assert!(!h.is_closed());
        h.close().unwrap();
        assert!(h.is_closed());
        assert!(matches!(h.close(), Err(RuntimeError::UnknownInterpreter(_))));
        assert_eq!(rt.interpreter_count(), 0);
    }

    #[test]
    fn test_drop_closes() {
        let rt = Runtime::default();
        let h = rt.create_interpreter(None).unwrap();
        let clone = h.clone();
        drop(h);
        assert_eq!(rt.interpreter_count(), 1);
        drop(clone);
        assert_eq!(rt.interpreter_count(), 0);
    }

    #[test]
    fn test_host_globals() {
        let rt = Runtime::default();
        let h = rt.create_interpreter(None).unwrap();
        h.set_global("n", Value::Int(41)).unwrap();
        assert!(h.run_code("n += 1").is_ok());
        assert_eq!(h.get_global("n").unwrap(), Some(Value::Int(42)));
        assert!(matches!(h.set_global("1x", Value::None), Err(RuntimeError::InvalidValue(_))));
        assert!(matches!(h.set_global("m", Value::Module("math".into())), Err(RuntimeError::InvalidValue(_))));
    }

    #[test]
    fn test_stats_count_runs() {
        let rt = Runtime::default();
        let h = rt.create_interpreter(None).unwrap();
        h.run_code("x = 1");
        h.run_code("1 / 0");
        let stats = h.stats().unwrap();
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.last_fault, Some(FaultKind::ZeroDivisionError));
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("_x1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }
}
