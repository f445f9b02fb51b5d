//! 统一数据管理模块
//!
//! 提供 JSON/TOML/ENV 配置文件的统一管理接口。
//!
//! # 模块组织
//!
//! - `error`: 统一错误类型定义
//! - `managers`: 各格式管理器（JSON/TOML/ENV）
//! - `manager`: 统一入口 `DataManager`

pub mod error;
pub mod manager;
pub mod managers;

pub use error::{DataError, Result};
pub use manager::DataManager;
