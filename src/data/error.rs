//! 统一错误类型定义
//!
//! 使用 `thiserror` 定义数据管理模块的所有错误类型，上层通过 `From` 转换为 `SyncError`。

use std::path::PathBuf;
use thiserror::Error;

/// 数据管理模块的统一错误类型
#[derive(Error, Debug)]
pub enum DataError {
    /// 文件 I/O 错误
    #[error("文件 I/O 错误: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON 序列化/反序列化错误
    #[error("JSON 解析错误: {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// TOML 解析错误（toml_edit）
    #[error("TOML 解析错误: {path}: {message}")]
    TomlEdit { path: PathBuf, message: String },

    /// 资源未找到
    #[error("未找到资源: {0}")]
    NotFound(String),

    /// 文件锁获取失败
    #[error("获取文件锁失败: {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 无效的键路径
    #[error("无效的键路径: {0}")]
    InvalidKey(String),
}

/// 便于与现有代码集成的类型别名
pub type Result<T> = std::result::Result<T, DataError>;

impl DataError {
    /// 从 `std::io::Error` 和路径创建 I/O 错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub fn toml(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::TomlEdit {
            path: path.into(),
            message: message.into(),
        }
    }
}
