pub mod cache;
pub mod memory;
pub mod memory_subsystem;
