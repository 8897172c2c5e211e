//! A cycle-accurate simulator of Tomasulo's algorithm with a reorder buffer
//! and a direct-mapped cache, for a small MIPS-like instruction set.

pub mod backend;
pub mod cpu;
pub mod error;
pub mod instructions;
pub mod loader;
pub mod memory_subsystem;

#[cfg(test)]
mod cpu_tests;

pub use backend::scheduler::{Scheduler, SimEvent};
pub use cpu::{load_sim_config, SimConfig, CPU};
pub use error::SimError;
