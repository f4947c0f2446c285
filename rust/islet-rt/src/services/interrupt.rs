//! Cooperative interruption: deadlines, cancellation and instruction budgets.
//!
//! The engine calls [`Interrupt::check`] at statement boundaries, loop
//! back-edges and calls. Cancellation flags are plain atomic loads and are
//! read on every check; the clock is read once per quantum of
//! [`CLOCK_QUANTUM`] checks, counted by a [`ReductionCounter`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Checks between two reads of the clock.
pub const CLOCK_QUANTUM: u32 = 64;

/// Longest single sleep inside an interruptible wait.
pub const SLEEP_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interruption {
    #[error("execution exceeded its time limit")]
    Timeout,
    #[error("execution exceeded its instruction limit of {0}")]
    InstructionLimit(u64),
    #[error("execution was cancelled")]
    Cancelled,
    #[error("interpreter was destroyed while running")]
    Closing,
}

/// Shared flag a host flips to cancel one run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A per-run check counter.
///
/// Starts at `budget` and decrements on each [`tick()`](Self::tick); reaching
/// zero signals that the slower checks are due.
#[derive(Debug, Clone)]
pub struct ReductionCounter {
    remaining: u32,
    budget: u32,
}

impl ReductionCounter {
    pub fn new(budget: u32) -> Self {
        Self { remaining: budget, budget }
    }

    /// Consume one reduction. Returns `true` when the budget is exhausted.
    #[inline]
    pub fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        self.remaining == 0
    }

    #[inline]
    pub fn reset(&mut self) {
        self.remaining = self.budget;
    }

    #[inline]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

/// Everything that can stop a run, gathered for the engine.
#[derive(Debug)]
pub struct Interrupt {
    deadline: Option<Instant>,
    cancel: CancelToken,
    closing: Arc<AtomicBool>,
    max_instructions: Option<u64>,
    executed: u64,
    counter: ReductionCounter,
}

impl Interrupt {
    pub fn new(deadline: Option<Instant>, cancel: CancelToken, closing: Arc<AtomicBool>) -> Self {
        Self {
            deadline,
            cancel,
            closing,
            max_instructions: None,
            executed: 0,
            counter: ReductionCounter::new(CLOCK_QUANTUM),
        }
    }

    /// An interrupt that never fires.
    pub fn unbounded() -> Self {
        Self::new(None, CancelToken::new(), Arc::new(AtomicBool::new(false)))
    }

    pub fn with_max_instructions(mut self, max: Option<u64>) -> Self {
        self.max_instructions = max;
        self
    }

    /// Count one instruction and report whether the run must stop.
    #[inline]
    pub fn check(&mut self) -> Result<(), Interruption> {
        self.executed += 1;
        if let Some(max) = self.max_instructions {
            if self.executed > max {
                return Err(Interruption::InstructionLimit(max));
            }
        }
        self.check_flags()?;
        if self.counter.tick() {
            self.counter.reset();
            self.check_deadline()?;
        }
        Ok(())
    }

    /// Full check without counting an instruction.
    pub fn check_now(&self) -> Result<(), Interruption> {
        self.check_flags()?;
        self.check_deadline()
    }

    fn check_flags(&self) -> Result<(), Interruption> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(Interruption::Closing);
        }
        if self.cancel.is_cancelled() {
            return Err(Interruption::Cancelled);
        }
        Ok(())
    }

    fn check_deadline(&self) -> Result<(), Interruption> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interruption::Timeout),
            _ => Ok(()),
        }
    }

    /// Sleep for `duration` in short slices, stopping early when interrupted.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interruption> {
        let wake = Instant::now().checked_add(duration);
        loop {
            self.check_now()?;
            let now = Instant::now();
            match wake {
                Some(wake) if now >= wake => return Ok(()),
                Some(wake) => std::thread::sleep((wake - now).min(SLEEP_SLICE)),
                None => std::thread::sleep(SLEEP_SLICE),
            }
        }
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_counter_exhausts_and_resets() {
        let mut c = ReductionCounter::new(3);
        assert!(!c.tick());
        assert!(!c.tick());
        assert!(c.tick());
        assert!(c.tick());
        c.reset();
        assert_eq!(c.remaining(), 3);
    }

    #[test]
    fn unbounded_never_fires() {
        let mut i = Interrupt::unbounded();
        for _ in 0..10_000 {
            assert!(i.check().is_ok());
        }
        assert_eq!(i.executed(), 10_000);
    }

    #[test]
    fn instruction_limit_fires() {
        let mut i = Interrupt::unbounded().with_max_instructions(Some(5));
        for _ in 0..5 {
            assert!(i.check().is_ok());
        }
        assert_eq!(i.check(), Err(Interruption::InstructionLimit(5)));
    }

    #[test]
    fn cancellation_is_seen_on_next_check() {
        let token = CancelToken::new();
        let mut i = Interrupt::new(None, token.clone(), Arc::new(AtomicBool::new(false)));
        assert!(i.check().is_ok());
        token.cancel();
        assert_eq!(i.check(), Err(Interruption::Cancelled));
    }

    #[test]
    fn closing_wins_over_cancel() {
        let token = CancelToken::new();
        token.cancel();
        let i = Interrupt::new(None, token, Arc::new(AtomicBool::new(true)));
        assert_eq!(i.check_now(), Err(Interruption::Closing));
    }

    #[test]
    fn expired_deadline_fires_within_a_quantum() {
        let mut i = Interrupt::new(Some(Instant::now()), CancelToken::new(), Arc::new(AtomicBool::new(false)));
        let fired = (0..=CLOCK_QUANTUM).any(|_| i.check().is_err());
        assert!(fired);
    }

    #[test]
    fn sleep_stops_at_deadline() {
        let start = Instant::now();
        let i = Interrupt::new(
            Some(start + Duration::from_millis(20)),
            CancelToken::new(),
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(i.sleep(Duration::from_secs(5)), Err(Interruption::Timeout));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
