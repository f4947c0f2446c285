//! Faults raised by interpreted code.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Kind of a runtime fault, named the way interpreted code names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum FaultKind {
    Exception,
    NameError,
    TypeError,
    ZeroDivisionError,
    IndexError,
    KeyError,
    ValueError,
    AttributeError,
    ImportError,
    RecursionError,
    MemoryError,
    OverflowError,
    /// A caught panic inside the runtime; never raisable by code.
    InternalError,
}

impl FaultKind {
    /// Kinds that `raise Kind(...)` may name.
    pub fn raisable(name: &str) -> Option<FaultKind> {
        match name.parse::<FaultKind>() {
            Ok(FaultKind::InternalError) | Err(_) => None,
            Ok(kind) => Some(kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    /// Source line of the statement that faulted, filled in as the fault unwinds.
    pub line: Option<usize>,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), line: None }
    }

    /// Attach a line unless an inner statement already did.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() && line > 0 {
            self.line = Some(line);
        }
        self
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(FaultKind::NameError, format!("name '{}' is not defined", name))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::IndexError, message)
    }

    pub fn key_error(key_repr: impl Into<String>) -> Self {
        Self::new(FaultKind::KeyError, key_repr)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ZeroDivisionError, message)
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::new(FaultKind::AttributeError, format!("'{}' object has no attribute '{}'", type_name, attr))
    }

    pub fn overflow() -> Self {
        Self::new(FaultKind::OverflowError, "integer overflow")
    }

    pub fn memory(message: impl Into<String>) -> Self {
        Self::new(FaultKind::MemoryError, message)
    }
}
