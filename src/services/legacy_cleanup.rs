//! 旧版备份文件清理
//!
//! 早期版本用 "按名称复制一份原生配置" 的方式保存 Profile，例如
//! `~/.claude/settings.work.json`、`~/.codex/config.work.toml` + `auth.work.json`、
//! `~/.gemini/.env.work`。这里负责发现、迁移与删除这些文件。
//!
//! 只删除能按命名规则明确识别的文件；单条记录失败不影响其他记录。

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{SyncError, SyncResult};
use crate::models::{Tool, ToolId};
use crate::services::native_config::{Adapters, NativeSnapshot};
use crate::services::profile_manager::ProfileStore;

static CLAUDE_SETTINGS_BACKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^settings\.(?P<name>.+)\.json$").expect("valid regex"));
static CODEX_CONFIG_BACKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^config\.(?P<name>.+)\.toml$").expect("valid regex"));
static CODEX_AUTH_BACKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^auth\.(?P<name>.+)\.json$").expect("valid regex"));
static GEMINI_ENV_BACKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.env\.(?P<name>.+)$").expect("valid regex"));

/// 工具自身使用、形似备份的文件名
const CLAUDE_OWN_NAMES: [&str; 1] = ["local"];

/// 单个备份文件及其对应的原生配置文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyFile {
    pub path: PathBuf,
    pub native_path: PathBuf,
}

/// 发现的旧版备份（同一工具同一名称的文件归为一条）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub tool_id: ToolId,
    pub profile_name: String,
    pub files: Vec<LegacyFile>,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Removed { paths: Vec<PathBuf> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResult {
    pub tool_id: ToolId,
    pub profile_name: String,
    pub outcome: CleanupOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrateOutcome {
    /// 已导入为 Profile，备份文件已删除
    Imported,
    /// 同名 Profile 已存在，备份文件已删除
    AlreadyExists,
    /// 备份无法解析或无法导入，文件保留
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateResult {
    pub tool_id: ToolId,
    pub profile_name: String,
    pub outcome: MigrateOutcome,
    /// 删除失败时的原因（导入本身已成功）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
}

/// 按命名规则识别备份文件，返回 (Profile 名称, 对应的原生文件名)
fn classify(tool_id: ToolId, file_name: &str) -> Option<(String, &'static str)> {
    let (captures, native) = match tool_id {
        ToolId::ClaudeCode => (CLAUDE_SETTINGS_BACKUP.captures(file_name)?, "settings.json"),
        ToolId::Codex => match CODEX_CONFIG_BACKUP.captures(file_name) {
            Some(c) => (c, "config.toml"),
            None => (CODEX_AUTH_BACKUP.captures(file_name)?, "auth.json"),
        },
        ToolId::GeminiCli => (GEMINI_ENV_BACKUP.captures(file_name)?, ".env"),
    };

    let name = captures.name("name")?.as_str();
    if name.is_empty() || name.starts_with('.') || name.ends_with(".tmp") {
        return None;
    }
    if tool_id == ToolId::ClaudeCode && CLAUDE_OWN_NAMES.contains(&name) {
        return None;
    }
    Some((name.to_string(), native))
}

pub struct LegacyCleanup {
    tools: Vec<Tool>,
}

impl LegacyCleanup {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self { tools }
    }

    pub fn for_home(home_dir: &Path) -> Self {
        Self::new(Tool::all_in(home_dir))
    }

    fn tool(&self, tool_id: ToolId) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id == tool_id)
    }

    /// 扫描所有工具目录中的旧版备份
    pub fn scan(&self) -> SyncResult<Vec<MigrationRecord>> {
        let mut records = Vec::new();
        for tool in &self.tools {
            records.extend(self.scan_tool(tool)?);
        }
        tracing::debug!(count = records.len(), "旧版备份扫描完成");
        Ok(records)
    }

    fn scan_tool(&self, tool: &Tool) -> SyncResult<Vec<MigrationRecord>> {
        if !tool.config_dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries =
            fs::read_dir(&tool.config_dir).map_err(|e| SyncError::io(&tool.config_dir, e))?;
        let mut grouped: BTreeMap<String, Vec<LegacyFile>> = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| SyncError::io(&tool.config_dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some((name, native)) = classify(tool.id, file_name) {
                grouped.entry(name).or_default().push(LegacyFile {
                    native_path: tool.config_dir.join(native),
                    path,
                });
            }
        }

        let now = Utc::now();
        Ok(grouped
            .into_iter()
            .map(|(profile_name, mut files)| {
                files.sort_by(|a, b| a.path.cmp(&b.path));
                MigrationRecord {
                    tool_id: tool.id,
                    profile_name,
                    files,
                    discovered_at: now,
                }
            })
            .collect())
    }

    /// 重新校验记录中的每个文件确属旧版备份
    fn verify(&self, record: &MigrationRecord) -> Result<(), String> {
        let tool = self
            .tool(record.tool_id)
            .ok_or_else(|| format!("未知工具: {}", record.tool_id))?;

        for file in &record.files {
            let recognized = file.path.parent() == Some(tool.config_dir.as_path())
                && file
                    .path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| classify(record.tool_id, n))
                    .is_some_and(|(name, native)| {
                        name == record.profile_name
                            && file.native_path == tool.config_dir.join(native)
                    });
            if !recognized {
                return Err(format!("无法识别为旧版备份: {}", file.path.display()));
            }
        }
        Ok(())
    }

    fn remove_record(&self, record: &MigrationRecord) -> CleanupOutcome {
        if let Err(reason) = self.verify(record) {
            return CleanupOutcome::Failed { reason };
        }

        let mut removed = Vec::new();
        for file in &record.files {
            match fs::remove_file(&file.path) {
                Ok(()) => removed.push(file.path.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return CleanupOutcome::Failed {
                        reason: format!("删除 {} 失败: {e}", file.path.display()),
                    };
                }
            }
        }
        CleanupOutcome::Removed { paths: removed }
    }

    /// 删除记录对应的备份文件
    pub fn clean(&self, records: &[MigrationRecord]) -> Vec<CleanupResult> {
        records
            .iter()
            .map(|record| {
                let outcome = self.remove_record(record);
                match &outcome {
                    CleanupOutcome::Removed { paths } => tracing::info!(
                        tool_id = %record.tool_id,
                        profile = %record.profile_name,
                        removed = paths.len(),
                        "已清理旧版备份"
                    ),
                    CleanupOutcome::Failed { reason } => tracing::warn!(
                        tool_id = %record.tool_id,
                        profile = %record.profile_name,
                        reason = %reason,
                        "清理旧版备份失败"
                    ),
                }
                CleanupResult {
                    tool_id: record.tool_id,
                    profile_name: record.profile_name.clone(),
                    outcome,
                }
            })
            .collect()
    }

    /// 先把可解析的备份导入为 Profile（同名跳过），再删除对应文件
    pub fn migrate(
        &self,
        records: &[MigrationRecord],
        store: &ProfileStore,
        adapters: &Adapters,
    ) -> Vec<MigrateResult> {
        records
            .iter()
            .map(|record| {
                let outcome = match self.import_record(record, store, adapters) {
                    Ok(outcome) => outcome,
                    Err(e) => MigrateOutcome::Failed {
                        reason: e.to_string(),
                    },
                };

                let cleanup_error = match outcome {
                    MigrateOutcome::Failed { .. } => None,
                    _ => match self.remove_record(record) {
                        CleanupOutcome::Removed { .. } => None,
                        CleanupOutcome::Failed { reason } => Some(reason),
                    },
                };

                tracing::info!(
                    tool_id = %record.tool_id,
                    profile = %record.profile_name,
                    outcome = ?outcome,
                    "旧版备份迁移"
                );
                MigrateResult {
                    tool_id: record.tool_id,
                    profile_name: record.profile_name.clone(),
                    outcome,
                    cleanup_error,
                }
            })
            .collect()
    }

    fn import_record(
        &self,
        record: &MigrationRecord,
        store: &ProfileStore,
        adapters: &Adapters,
    ) -> SyncResult<MigrateOutcome> {
        self.verify(record).map_err(|reason| {
            SyncError::parse(
                record.files.first().map(|f| f.path.clone()).unwrap_or_default(),
                reason,
            )
        })?;

        if store.find(record.tool_id, &record.profile_name)?.is_some() {
            return Ok(MigrateOutcome::AlreadyExists);
        }

        let adapter = adapters.get(record.tool_id);
        let mut snapshot = NativeSnapshot::new();
        for path in adapter.paths() {
            snapshot.insert(path, None);
        }
        for file in &record.files {
            let content = fs::read(&file.path).map_err(|e| SyncError::io(&file.path, e))?;
            snapshot.insert(file.native_path.clone(), Some(content));
        }

        let creds = adapter.parse(&snapshot)?;
        if creds.api_key.is_empty() || creds.base_url.is_empty() {
            return Ok(MigrateOutcome::Failed {
                reason: "备份中缺少 API Key 或 Base URL".to_string(),
            });
        }

        store.create(record.tool_id, &record.profile_name, &creds)?;
        Ok(MigrateOutcome::Imported)
    }
}
