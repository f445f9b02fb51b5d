//! 旧版备份命令

use anyhow::Result;
use duckcoding_sync::services::legacy_cleanup::{CleanupOutcome, MigrateOutcome};
use duckcoding_sync::{MigrationRecord, ReconciliationService};

use super::types::Output;

fn describe_records(records: &[MigrationRecord]) -> String {
    if records.is_empty() {
        return "未发现旧版备份文件".to_string();
    }
    records
        .iter()
        .map(|r| {
            let files = r
                .files
                .iter()
                .map(|f| f.path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} / {}: {files}", r.tool_id, r.profile_name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn scan(service: &ReconciliationService, out: Output) -> Result<()> {
    let records = service.scan_legacy().await?;
    out.emit(records.as_slice(), describe_records)
}

pub async fn clean(service: &ReconciliationService, out: Output) -> Result<()> {
    let records = service.scan_legacy().await?;
    let results = service.clean_legacy(records).await?;
    out.emit(results.as_slice(), |results| {
        if results.is_empty() {
            return "未发现旧版备份文件".to_string();
        }
        results
            .iter()
            .map(|r| match &r.outcome {
                CleanupOutcome::Removed { paths } => {
                    format!("{} / {}: 已删除 {} 个文件", r.tool_id, r.profile_name, paths.len())
                }
                CleanupOutcome::Failed { reason } => {
                    format!("{} / {}: 失败 {reason}", r.tool_id, r.profile_name)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub async fn migrate(service: &ReconciliationService, out: Output) -> Result<()> {
    let records = service.scan_legacy().await?;
    let results = service.migrate_legacy(records).await?;
    out.emit(results.as_slice(), |results| {
        if results.is_empty() {
            return "未发现旧版备份文件".to_string();
        }
        results
            .iter()
            .map(|r| {
                let outcome = match &r.outcome {
                    MigrateOutcome::Imported => "已导入".to_string(),
                    MigrateOutcome::AlreadyExists => "同名 Profile 已存在，跳过导入".to_string(),
                    MigrateOutcome::Failed { reason } => format!("失败 {reason}"),
                };
                match &r.cleanup_error {
                    Some(err) => format!(
                        "{} / {}: {outcome}（清理失败: {err}）",
                        r.tool_id, r.profile_name
                    ),
                    None => format!("{} / {}: {outcome}", r.tool_id, r.profile_name),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}
