pub mod change_commands;
pub mod legacy_commands;
pub mod profile_commands;
pub mod proxy_commands;
pub mod types;
pub mod watcher_commands;

pub use types::Output;
