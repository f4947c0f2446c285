//! Baseline modules importable by interpreted code.
//!
//! Every `import` instantiates the module inside the importing context, so
//! module state (such as a random generator) is never shared between
//! interpreters.

mod json;
mod math;
mod random;
mod time;

use crate::config::InterpreterConfig;
use crate::engine::{Args, Unwind};
use crate::fault::Fault;
use crate::services::interrupt::Interrupt;
use crate::values::{Builtin, Value};
use rand::rngs::StdRng;

pub const KNOWN_MODULES: &[&str] = &["math", "random", "time", "json"];

pub fn is_known(name: &str) -> bool {
    KNOWN_MODULES.contains(&name)
}

#[derive(Debug)]
enum ModuleState {
    Math,
    Random(StdRng),
    Time,
    Json,
}

/// A module loaded into one context.
#[derive(Debug)]
pub struct ModuleInstance {
    name: &'static str,
    state: ModuleState,
}

/// Create a fresh instance of `name` for a context configured by `config`.
pub fn instantiate(name: &str, config: &InterpreterConfig) -> Option<ModuleInstance> {
    let (name, state) = match name {
        "math" => ("math", ModuleState::Math),
        "random" => ("random", ModuleState::Random(random::generator(config.random_seed))),
        "time" => ("time", ModuleState::Time),
        "json" => ("json", ModuleState::Json),
        _ => return None,
    };
    Some(ModuleInstance { name, state })
}

impl ModuleInstance {
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn functions(&self) -> &'static [&'static str] {
        match self.state {
            ModuleState::Math => math::FUNCTIONS,
            ModuleState::Random(_) => random::FUNCTIONS,
            ModuleState::Time => time::FUNCTIONS,
            ModuleState::Json => json::FUNCTIONS,
        }
    }

    /// `module.name`: a constant or a callable.
    pub fn attr(&self, name: &str) -> Option<Value> {
        if let ModuleState::Math = self.state {
            if let Some(value) = math::constant(name) {
                return Some(value);
            }
        }
        self.functions().iter().find(|f| **f == name).map(|f| Value::Builtin(Builtin::Module(self.name, *f)))
    }

    pub fn call(&mut self, func: &str, args: Args, interrupt: &Interrupt) -> Result<Value, Unwind> {
        let name = self.name;
        let result = match &mut self.state {
            ModuleState::Math => math::call(func, args),
            ModuleState::Random(rng) => random::call(rng, func, args),
            ModuleState::Time => return time::call(func, args, interrupt),
            ModuleState::Json => json::call(func, args),
        };
        result.map_err(|f| qualify(name, f).into())
    }
}

/// Prefix argument errors with the module name, as in `math.sqrt()`.
fn qualify(module: &str, mut fault: Fault) -> Fault {
    if fault.message.starts_with(|c: char| c.is_ascii_lowercase()) && fault.message.contains("()") {
        fault.message = format!("{}.{}", module, fault.message);
    }
    fault
}
