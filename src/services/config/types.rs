use crate::models::ToolId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 外部配置变更（按 `(tool_id, path)` 去重，后到覆盖先到）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalConfigChange {
    pub tool_id: ToolId,
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
    pub checksum: String,
    /// 检测时的文件文本；文件不存在、非 UTF-8 或过大时为 `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_snapshot: Option<String>,
}

/// 导入外部变更的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub profile_name: String,
    pub was_new: bool,
    pub replaced: bool,
    pub before_checksum: Option<String>,
    pub checksum: String,
}

/// 监听器运行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    pub enabled: bool,
    pub poll_interval: Duration,
}

/// 监听器状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherStatus {
    pub enabled: bool,
    pub running: bool,
    /// 文件系统通知是否可用（否则仅轮询）
    pub push_active: bool,
    pub poll_interval_ms: u64,
    pub pending: usize,
}
