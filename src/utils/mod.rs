pub mod config;
pub mod file_helpers;
pub mod task;

pub use config::*;
pub use file_helpers::*;
pub use task::run_blocking;
