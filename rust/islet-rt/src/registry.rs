//! Process-wide table of live interpreter contexts.
//!
//! The id table sits behind one `RwLock` that is held only for map
//! operations. Each context lives in its own slot with its own mutex, so
//! distinct interpreters run in parallel without touching the table lock.

use crate::config::{BusyPolicy, InterpreterConfig};
use crate::context::InterpreterContext;
use crate::error::RuntimeError;
use crate::services::interrupt::CancelToken;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Opaque interpreter identifier; issued once and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterpreterId(u64);

impl InterpreterId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InterpreterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interp-{}", self.0)
    }
}

/// A registered context plus the flags used to stop its in-flight run.
#[derive(Debug)]
pub struct ContextSlot {
    id: InterpreterId,
    context: Mutex<InterpreterContext>,
    closing: Arc<AtomicBool>,
    active: Mutex<Option<CancelToken>>,
    busy_policy: BusyPolicy,
    default_timeout: Option<Duration>,
}

impl ContextSlot {
    fn new(context: InterpreterContext) -> Self {
        Self {
            id: context.id(),
            busy_policy: context.config().busy_policy,
            default_timeout: context.config().resource_limits.default_timeout(),
            context: Mutex::new(context),
            closing: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        }
    }

    pub fn id(&self) -> InterpreterId {
        self.id
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        self.busy_policy
    }

    /// Timeout applied to runs that do not set their own.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn closing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closing)
    }

    /// Acquire exclusive use of the context according to `policy`.
    ///
    /// `Block` waits at most `wait` (forever when `None`).
    pub fn bind(
        &self,
        policy: BusyPolicy,
        wait: Option<Duration>,
    ) -> Result<MutexGuard<'_, InterpreterContext>, RuntimeError> {
        let guard = match (policy, wait) {
            (BusyPolicy::FailFast, _) => self.context.try_lock(),
            (BusyPolicy::Block, Some(wait)) => self.context.try_lock_for(wait),
            (BusyPolicy::Block, None) => Some(self.context.lock()),
        };
        let guard = guard.ok_or(RuntimeError::ContextBusy(self.id))?;
        if !guard.is_live() {
            return Err(RuntimeError::ContextDestroyed(self.id));
        }
        Ok(guard)
    }

    /// Register the cancel token of the run that now holds the context.
    pub fn set_active(&self, token: Option<CancelToken>) {
        *self.active.lock() = token;
    }

    /// Cancel the in-flight run, if any. Returns whether one was running.
    pub fn cancel_active(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    slots: RwLock<HashMap<InterpreterId, Arc<ContextSlot>>>,
    next_id: AtomicU64,
    max_interpreters: Option<usize>,
}

impl Registry {
    pub fn new(max_interpreters: Option<usize>) -> Self {
        Self::starting_at(1, max_interpreters)
    }

    fn starting_at(first_id: u64, max_interpreters: Option<usize>) -> Self {
        Self { slots: RwLock::new(HashMap::new()), next_id: AtomicU64::new(first_id), max_interpreters }
    }

    /// Allocate, initialize and register a new context.
    ///
    /// The context is built outside the registry lock; the interpreter limit is
    /// checked again when it is inserted.
    pub fn create(&self, config: InterpreterConfig) -> Result<(InterpreterId, Arc<ContextSlot>), RuntimeError> {
        config.validate()?;
        self.check_capacity(self.slots.read().len())?;
        let raw = self
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| RuntimeError::ResourceExhausted("interpreter ids exhausted".into()))?;
        let id = InterpreterId(raw);
        let name = config.name.clone();
        let context = InterpreterContext::initialize(id, config)?;
        let slot = Arc::new(ContextSlot::new(context));
        let mut slots = self.slots.write();
        self.check_capacity(slots.len())?;
        slots.insert(id, Arc::clone(&slot));
        drop(slots);
        info!("created interpreter {} ({})", id, name.as_deref().unwrap_or("unnamed"));
        Ok((id, slot))
    }

    fn check_capacity(&self, live: usize) -> Result<(), RuntimeError> {
        match self.max_interpreters {
            Some(max) if live >= max => {
                Err(RuntimeError::ResourceExhausted(format!("interpreter limit of {} reached", max)))
            }
            _ => Ok(()),
        }
    }

    pub fn lookup(&self, id: InterpreterId) -> Result<Arc<ContextSlot>, RuntimeError> {
        self.slots.read().get(&id).cloned().ok_or(RuntimeError::UnknownInterpreter(id))
    }

    /// Unregister `id`, stop its in-flight run and tear the context down.
    pub fn destroy(&self, id: InterpreterId) -> Result<(), RuntimeError> {
        let slot = self.slots.write().remove(&id).ok_or(RuntimeError::UnknownInterpreter(id))?;
        slot.closing.store(true, Ordering::SeqCst);
        slot.cancel_active();
        let mut context = slot.context.lock();
        context.teardown();
        drop(context);
        info!("destroyed interpreter {}", id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    pub fn ids(&self) -> Vec<InterpreterId> {
        let mut ids: Vec<InterpreterId> = self.slots.read().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextState;

    #[test]
    fn test_ids_are_unique_and_not_reused() {
        let reg = Registry::default();
        let (a, _) = reg.create(InterpreterConfig::default()).unwrap();
        reg.destroy(a).unwrap();
        let (b, _) = reg.create(InterpreterConfig::default()).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "interp-1");
        assert_eq!(b.to_string(), "interp-2");
    }

    #[test]
    fn test_lookup_and_destroy() {
        let reg = Registry::default();
        let (id, slot) = reg.create(InterpreterConfig::default()).unwrap();
        assert!(reg.lookup(id).is_ok());
        reg.destroy(id).unwrap();
        assert!(matches!(reg.lookup(id), Err(RuntimeError::UnknownInterpreter(_))));
        assert!(matches!(reg.destroy(id), Err(RuntimeError::UnknownInterpreter(_))));
        assert_eq!(slot.context.lock().state(), ContextState::Destroyed);
        assert!(matches!(slot.bind(BusyPolicy::Block, None), Err(RuntimeError::ContextDestroyed(_))));
    }

    #[test]
    fn test_never_issued_id_is_unknown() {
        let reg = Registry::default();
        assert!(matches!(reg.lookup(InterpreterId::new(99)), Err(RuntimeError::UnknownInterpreter(_))));
    }

    #[test]
    fn test_max_interpreters() {
        let reg = Registry::new(Some(2));
        let (a, _) = reg.create(InterpreterConfig::default()).unwrap();
        reg.create(InterpreterConfig::default()).unwrap();
        assert!(matches!(reg.create(InterpreterConfig::default()), Err(RuntimeError::ResourceExhausted(_))));
        reg.destroy(a).unwrap();
        assert!(reg.create(InterpreterConfig::default()).is_ok());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_concurrent_creates_respect_max_interpreters() {
        let reg = Arc::new(Registry::new(Some(3)));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let config = InterpreterConfig::default().with_baseline_modules(["math", "json", "random", "time"]);
                    reg.create(config).map(|(id, _)| id).ok()
                })
            })
            .collect();
        let mut created: Vec<_> = workers.into_iter().filter_map(|w| w.join().unwrap()).collect();
        assert_eq!(created.len(), 3);
        created.sort();
        created.dedup();
        assert_eq!(created.len(), 3);
        assert_eq!(reg.len(), 3);
        for id in created {
            assert!(reg.lookup(id).is_ok());
        }
    }

    #[test]
    fn test_id_counter_exhaustion() {
        let reg = Registry::starting_at(u64::MAX, None);
        assert!(matches!(reg.create(InterpreterConfig::default()), Err(RuntimeError::ResourceExhausted(_))));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let reg = Registry::default();
        let cfg = InterpreterConfig::default().with_baseline_modules(["nope"]);
        assert!(matches!(reg.create(cfg), Err(RuntimeError::InvalidConfig(_))));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_fail_fast_bind_reports_busy() {
        let reg = Registry::default();
        let (_, slot) = reg.create(InterpreterConfig::default()).unwrap();
        let _held = slot.bind(BusyPolicy::Block, None).unwrap();
        assert!(matches!(slot.bind(BusyPolicy::FailFast, None), Err(RuntimeError::ContextBusy(_))));
        assert!(matches!(
            slot.bind(BusyPolicy::Block, Some(Duration::from_millis(10))),
            Err(RuntimeError::ContextBusy(_))
        ));
    }

    #[test]
    fn test_cancel_active() {
        let reg = Registry::default();
        let (_, slot) = reg.create(InterpreterConfig::default()).unwrap();
        assert!(!slot.cancel_active());
        let token = CancelToken::new();
        slot.set_active(Some(token.clone()));
        assert!(slot.cancel_active());
        assert!(token.is_cancelled());
    }
}
