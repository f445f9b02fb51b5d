//! DuckCoding 日志系统模块
//!
//! 提供结构化、异步、可配置的日志功能，支持：
//! - 控制台（stderr）和按天滚动的文件输出
//! - JSON格式可选
//! - 非阻塞异步处理
//! - 环境变量覆盖（`RUST_LOG`、`DUCKCODING_LOG_*`）

pub mod config;
pub mod logger;

pub use config::{LogLevel, LoggingConfig};
pub use logger::{init_global_logger, LogManager};
