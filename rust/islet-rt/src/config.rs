//! Runtime and interpreter configuration, loadable from `islet.toml`.
//!
//! ```toml
//! max_interpreters = 64
//!
//! [interpreter]
//! baseline_modules = ["math"]
//! busy_policy = "fail-fast"
//!
//! [interpreter.resource_limits]
//! default_timeout_ms = 2000
//! max_call_depth = 64
//! ```

use crate::modules;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default interpreted call depth before `RecursionError`.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 100;

/// Default namespace footprint limit (64 MiB).
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 64 * 1024 * 1024;

/// Default cap on buffered `print` output per run (8 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("cannot read '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid toml in '{path}': {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// What a run does when another run already holds the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusyPolicy {
    /// Wait for the running call to finish, bounded by the run's timeout.
    #[default]
    Block,
    /// Report `ContextBusy` immediately.
    FailFast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Approximate byte budget for the global namespace; `None` is unlimited.
    pub max_memory_bytes: Option<u64>,
    /// Applied when a run does not pass its own timeout.
    pub default_timeout_ms: Option<u64>,
    /// Statement and call budget per run; exceeding it reports `Timeout`.
    pub max_instructions: Option<u64>,
    pub max_call_depth: usize,
    pub max_output_bytes: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: Some(DEFAULT_MAX_MEMORY_BYTES),
            default_timeout_ms: None,
            max_instructions: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_output_bytes: Some(DEFAULT_MAX_OUTPUT_BYTES),
        }
    }
}

impl ResourceLimits {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis().min(u64::MAX as u128) as u64);
        self
    }

    pub fn with_max_memory_bytes(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    pub fn with_max_instructions(mut self, count: u64) -> Self {
        self.max_instructions = Some(count);
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: u64) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Label used in logs.
    pub name: Option<String>,
    pub resource_limits: ResourceLimits,
    /// Modules bound into the namespace when the interpreter is created.
    pub baseline_modules: Vec<String>,
    /// Modules `import` may load; `None` allows every known module.
    pub allowed_modules: Option<Vec<String>>,
    /// Seed for the `random` module; `None` seeds from entropy.
    pub random_seed: Option<u64>,
    pub busy_policy: BusyPolicy,
}

impl InterpreterConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn with_baseline_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.baseline_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_modules = Some(modules.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    pub fn is_module_allowed(&self, name: &str) -> bool {
        match &self.allowed_modules {
            Some(allowed) => allowed.iter().any(|m| m == name),
            None => true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.resource_limits;
        if limits.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be at least 1".into()));
        }
        for (field, value) in [
            ("max_memory_bytes", limits.max_memory_bytes),
            ("default_timeout_ms", limits.default_timeout_ms),
            ("max_instructions", limits.max_instructions),
            ("max_output_bytes", limits.max_output_bytes),
        ] {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", field)));
            }
        }
        if let Some(allowed) = &self.allowed_modules {
            if let Some(unknown) = allowed.iter().find(|m| !modules::is_known(m)) {
                return Err(ConfigError::Invalid(format!("unknown module '{}' in allowed_modules", unknown)));
            }
        }
        for module in &self.baseline_modules {
            if !modules::is_known(module) {
                return Err(ConfigError::Invalid(format!("unknown baseline module '{}'", module)));
            }
            if !self.is_module_allowed(module) {
                return Err(ConfigError::Invalid(format!("baseline module '{}' is not in allowed_modules", module)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Cap on simultaneously live interpreters; `None` is unlimited.
    pub max_interpreters: Option<usize>,
    /// Used when `create_interpreter` is called without a config.
    pub interpreter: InterpreterConfig,
}

impl RuntimeConfig {
    pub fn with_max_interpreters(mut self, max: usize) -> Self {
        self.max_interpreters = Some(max);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config = Self::from_toml_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_interpreters == Some(0) {
            return Err(ConfigError::Invalid("max_interpreters must be greater than zero".into()));
        }
        self.interpreter.validate()
    }
}
