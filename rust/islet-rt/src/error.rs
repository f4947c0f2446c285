use crate::config::ConfigError;
use crate::registry::InterpreterId;
use thiserror::Error;

/// Errors surfaced by the registry and the coordinator.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown interpreter {0}")]
    UnknownInterpreter(InterpreterId),
    #[error("interpreter {0} has been destroyed")]
    ContextDestroyed(InterpreterId),
    #[error("interpreter {0} is busy")]
    ContextBusy(InterpreterId),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}
