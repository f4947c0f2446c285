//! Islet runtime: many isolated interpreters inside one process.
//!
//! ```no_run
//! use islet_rt::create_interpreter;
//!
//! let a = create_interpreter(None).unwrap();
//! let b = create_interpreter(None).unwrap();
//! assert_eq!(a.run_code("x = 5\nprint(x)").output(), "5\n");
//! assert!(!b.run_code("print(x)").is_ok());
//! ```

pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod fault;
pub mod logging;
pub mod modules;
pub mod registry;
pub mod result;
pub mod services;
pub mod values;

pub use config::{BusyPolicy, ConfigError, InterpreterConfig, ResourceLimits, RuntimeConfig};
pub use coordinator::{create_interpreter, Handle, RunOptions, Runtime};
pub use error::RuntimeError;
pub use fault::{Fault, FaultKind};
pub use registry::InterpreterId;
pub use result::{ErrorKind, ExecutionFailure, ExecutionResult};
pub use services::interrupt::CancelToken;
pub use values::{Key, Value};
