//! The outcome of one `run_code` call.

use crate::error::RuntimeError;
use crate::fault::{Fault, FaultKind};
use crate::services::interrupt::Interruption;
use islet_compiler::CompileError;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ErrorKind {
    CompileError,
    RuntimeFault,
    Timeout,
    ContextBusy,
    UnknownInterpreter,
    ContextDestroyed,
    Cancelled,
    ResourceExhausted,
    InvalidConfig,
}

/// Serializes as `{"status":"ok","output":...}` or
/// `{"status":"error","kind":...,"message":...,...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionResult {
    Ok { output: String },
    Error(ExecutionFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Output printed before the failure.
    #[serde(default)]
    pub output: String,
}

impl ExecutionResult {
    pub fn ok(output: String) -> Self {
        ExecutionResult::Ok { output }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ExecutionResult::Error(ExecutionFailure {
            kind,
            message: message.into(),
            fault: None,
            line: None,
            output: String::new(),
        })
    }

    pub fn compile_error(err: &CompileError) -> Self {
        let line = err.line();
        ExecutionResult::Error(ExecutionFailure {
            kind: ErrorKind::CompileError,
            message: err.to_string(),
            fault: None,
            line: (line > 0).then_some(line),
            output: String::new(),
        })
    }

    pub fn fault(fault: Fault, output: String) -> Self {
        ExecutionResult::Error(ExecutionFailure {
            kind: ErrorKind::RuntimeFault,
            message: fault.message,
            fault: Some(fault.kind),
            line: fault.line,
            output,
        })
    }

    pub fn interrupted(reason: Interruption, output: String) -> Self {
        let kind = match reason {
            Interruption::Timeout | Interruption::InstructionLimit(_) => ErrorKind::Timeout,
            Interruption::Cancelled => ErrorKind::Cancelled,
            Interruption::Closing => ErrorKind::ContextDestroyed,
        };
        ExecutionResult::Error(ExecutionFailure {
            kind,
            message: reason.to_string(),
            fault: None,
            line: None,
            output,
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionResult::Ok { .. })
    }

    pub fn output(&self) -> &str {
        match self {
            ExecutionResult::Ok { output } => output,
            ExecutionResult::Error(f) => &f.output,
        }
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        match self {
            ExecutionResult::Ok { .. } => None,
            ExecutionResult::Error(f) => Some(f),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure().map(|f| f.kind)
    }

    pub fn fault_kind(&self) -> Option<FaultKind> {
        self.failure().and_then(|f| f.fault)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"status\":\"error\",\"message\":\"{}\"}}", e))
    }
}

impl From<RuntimeError> for ExecutionResult {
    fn from(err: RuntimeError) -> Self {
        let kind = match &err {
            RuntimeError::UnknownInterpreter(_) => ErrorKind::UnknownInterpreter,
            RuntimeError::ContextDestroyed(_) => ErrorKind::ContextDestroyed,
            RuntimeError::ContextBusy(_) => ErrorKind::ContextBusy,
            RuntimeError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            RuntimeError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            RuntimeError::InvalidValue(_) => ErrorKind::RuntimeFault,
        };
        ExecutionResult::error(kind, err.to_string())
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::Ok { .. } => write!(f, "ok"),
            ExecutionResult::Error(e) => match (e.fault, e.line) {
                (Some(fault), Some(line)) => write!(f, "{} at line {}: {}: {}", e.kind, line, fault, e.message),
                (Some(fault), None) => write!(f, "{}: {}: {}", e.kind, fault, e.message),
                (None, _) => write!(f, "{}: {}", e.kind, e.message),
            },
        }
    }
}
