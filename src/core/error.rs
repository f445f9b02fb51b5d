//! 同步引擎错误类型
//!
//! 所有对外操作都返回 `SyncResult`，调用方根据变体决定提示方式。
//! 只有监听循环会吞掉瞬时 I/O 错误（记录日志后等待下一轮）。

use crate::data::DataError;
use crate::models::ToolId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Profile、工具或被追踪的文件不存在
    #[error("未找到: {0}")]
    NotFound(String),

    /// Profile 名称为空、重复或使用了保留前缀
    #[error("无效的 Profile 名称: {0}")]
    InvalidName(String),

    /// Profile 内容不完整（创建时缺少 API Key 或 Base URL）
    #[error("无效的 Profile 内容: {0}")]
    InvalidProfile(String),

    /// 原生配置文件无法读写
    #[error("文件 I/O 错误: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 原生配置内容不是预期格式
    #[error("解析失败: {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// 代理未运行或热更新失败
    #[error("透明代理不可用: {0}")]
    ProxyUnavailable(String),

    /// 覆盖式导入时找不到可覆盖的 Profile
    #[error("{0} 没有可覆盖的激活 Profile")]
    NoActiveProfile(ToolId),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 解析错误在只读场景下视为 "custom" 状态
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// CLI 退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) => 2,
            Self::InvalidName(_) => 3,
            Self::Io { .. } => 4,
            Self::Parse { .. } => 5,
            Self::ProxyUnavailable(_) => 6,
            Self::NoActiveProfile(_) => 7,
            Self::InvalidProfile(_) => 8,
        }
    }
}

impl From<DataError> for SyncError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Io { path, source } => Self::Io { path, source },
            DataError::Json { path, source } => Self::parse(path, source.to_string()),
            DataError::TomlEdit { path, message } => Self::parse(path, message),
            DataError::NotFound(what) => Self::NotFound(what),
            DataError::Lock { path, source } => Self::Io { path, source },
            DataError::InvalidKey(key) => Self::parse(PathBuf::new(), format!("无效的键: {key}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::NotFound("codex/work".to_string());
        assert_eq!(err.to_string(), "未找到: codex/work");

        let err = SyncError::NoActiveProfile(ToolId::Codex);
        assert_eq!(err.to_string(), "codex 没有可覆盖的激活 Profile");
    }

    #[test]
    fn test_data_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SyncError = DataError::io("/tmp/settings.json", io_err).into();
        assert!(matches!(err, SyncError::Io { .. }));
        assert!(err.to_string().contains("/tmp/settings.json"));

        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: SyncError = DataError::json("/tmp/auth.json", json_err).into();
        assert!(err.is_parse());
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            SyncError::NotFound(String::new()).exit_code(),
            SyncError::InvalidName(String::new()).exit_code(),
            SyncError::parse("", "").exit_code(),
            SyncError::ProxyUnavailable(String::new()).exit_code(),
            SyncError::NoActiveProfile(ToolId::ClaudeCode).exit_code(),
        ];
        let mut sorted = codes.to_vec();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn test_anyhow_conversion() {
        let err = SyncError::InvalidName("dc_proxy_x".to_string());
        let anyhow_err: anyhow::Error = err.into();
        assert!(anyhow_err.to_string().contains("dc_proxy_x"));
    }
}
