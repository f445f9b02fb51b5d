//! 外部变更命令

use anyhow::Result;
use duckcoding_sync::{ExternalConfigChange, ReconciliationService, Tool, ToolId};
use std::path::PathBuf;

use super::types::Output;

pub(crate) fn describe_change(change: &ExternalConfigChange) -> String {
    format!(
        "[{}] {}  {}  ({})",
        change.detected_at.format("%Y-%m-%d %H:%M:%S"),
        change.tool_id,
        change.path.display(),
        &change.checksum[..change.checksum.len().min(12)]
    )
}

fn describe_changes(changes: &[ExternalConfigChange]) -> String {
    if changes.is_empty() {
        return "没有待处理的外部变更".to_string();
    }
    changes
        .iter()
        .map(describe_change)
        .collect::<Vec<_>>()
        .join("\n")
}

/// 列出待处理变更
///
/// 待处理集合只存在于进程内，因此先执行一轮检测。
pub async fn list_changes(service: &ReconciliationService, out: Output) -> Result<()> {
    service.detect_external_changes().await?;
    let pending = service.get_pending_changes();
    out.emit(pending.as_slice(), describe_changes)
}

pub async fn scan_changes(service: &ReconciliationService, out: Output) -> Result<()> {
    let changes = service.detect_external_changes().await?;
    out.emit(changes.as_slice(), describe_changes)
}

pub async fn acknowledge(
    service: &ReconciliationService,
    out: Output,
    tool_id: ToolId,
) -> Result<()> {
    // 先检测，确认的是磁盘上的最新内容
    service.detect_external_changes().await?;
    let cleared = service.acknowledge_change(tool_id).await?;
    out.emit(
        &serde_json::json!({ "tool_id": tool_id, "cleared": cleared }),
        |_| format!("已忽略 {tool_id} 的 {cleared} 条外部变更"),
    )
}

pub async fn import(
    service: &ReconciliationService,
    out: Output,
    home_dir: &std::path::Path,
    tool_id: ToolId,
    path: Option<PathBuf>,
    as_new: Option<String>,
) -> Result<()> {
    let path = path.unwrap_or_else(|| Tool::in_home(tool_id, home_dir).primary_path());
    service.detect_external_changes().await?;
    let result = service
        .import_external_change(tool_id, &path, as_new)
        .await?;
    out.emit(&result, |r| {
        if r.was_new {
            format!("已导入为新 Profile {tool_id} / {}", r.profile_name)
        } else {
            format!("已覆盖 Profile {tool_id} / {}", r.profile_name)
        }
    })
}
