pub mod execution_unit;
pub mod register_file;
pub mod reorder_buffer;
pub mod reservation_station;
pub mod scheduler;
pub mod snapshot;
