//! Runtime services shared by the engine and the coordinator.

pub mod interrupt;
pub mod panic_boundary;
