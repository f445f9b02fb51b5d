//! 外部配置变更检测
//!
//! - `types`: 变更事件、导入结果、监听器状态
//! - `watcher`: 推送（notify）+ 轮询双通道监听

pub mod types;
pub mod watcher;

pub use types::{ExternalConfigChange, ImportResult, WatchSettings, WatcherStatus};
pub use watcher::ChangeWatcher;
