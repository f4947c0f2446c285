//! Panic-vs-result boundary around interpreted execution.
//!
//! A bug in the engine must never take the host process down. Every run is
//! wrapped with [`with_panic_boundary`]; a caught panic becomes a
//! [`PanicError`] which the coordinator reports as an `InternalError` fault.

use std::any::Any;
use std::fmt;
use std::panic::UnwindSafe;

/// A caught panic with its message extracted where possible.
#[derive(Debug, Clone)]
pub struct PanicError {
    message: String,
}

impl PanicError {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        Self { message: extract_panic_message(&payload) }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

impl std::error::Error for PanicError {}

fn extract_panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Catch a panic from `f` and convert it to `Result<T, PanicError>`.
pub fn catch_panic<T>(f: impl FnOnce() -> T + UnwindSafe) -> Result<T, PanicError> {
    std::panic::catch_unwind(f).map_err(PanicError::from_payload)
}

/// [`catch_panic`], plus a `warn!` event carrying the panic message.
pub fn with_panic_boundary<T>(f: impl FnOnce() -> T + UnwindSafe) -> Result<T, PanicError> {
    catch_panic(f).inspect_err(|e| tracing::warn!("caught panic in interpreter: {}", e.message()))
}
