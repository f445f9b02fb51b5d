//! 原生配置适配器
//!
//! 每个工具一个适配器，负责在工具自己的文件格式与 [`Credentials`] 之间转换：
//! - `parse`：从快照解析凭证
//! - `serialize`：在快照基础上写入凭证，保留无关字段与注释
//! - `write`：暂存全部临时文件后再依次 rename，并把写入结果记入 [`FingerprintLedger`]
//!
//! 所有比较都基于"规范指纹"：`serialize(snapshot, parse(snapshot))`，
//! 因此格式差异（引号、`/v1` 后缀、键顺序）不会被误判为不同配置。

mod claude;
mod codex;
mod gemini;

pub use claude::ClaudeAdapter;
pub use codex::{CodexAdapter, CODEX_PROVIDER_NAME};
pub use gemini::GeminiAdapter;

use crate::core::{SyncError, SyncResult};
use crate::models::{Tool, ToolId};
use crate::services::profile_manager::Credentials;
use crate::utils::file_helpers::{atomic_write, content_checksum, read_optional, write_temp};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

// ==================== 快照 ====================

/// 一个工具全部原生文件在某一时刻的内容，`None` 表示文件不存在
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeSnapshot {
    files: BTreeMap<PathBuf, Option<Vec<u8>>>,
}

impl NativeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从磁盘读取给定文件
    pub fn load(paths: &[PathBuf]) -> SyncResult<Self> {
        let mut snapshot = Self::new();
        for path in paths {
            let content = read_optional(path).map_err(|e| SyncError::io(path, e))?;
            snapshot.insert(path.clone(), content);
        }
        Ok(snapshot)
    }

    pub fn insert(&mut self, path: PathBuf, content: Option<Vec<u8>>) {
        self.files.insert(path, content);
    }

    pub fn with_file(mut self, path: PathBuf, content: Option<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    /// 文件内容；未追踪或不存在时返回 `None`
    pub fn get(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).and_then(|c| c.as_deref())
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    /// 以 UTF-8（有损）文本形式返回文件内容
    pub fn text(&self, path: &Path) -> Option<String> {
        self.get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// 整个快照的指纹：按路径排序后对路径与内容做 SHA256
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.files {
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            match content {
                Some(bytes) => {
                    hasher.update((bytes.len() as u64).to_le_bytes());
                    hasher.update(bytes);
                }
                None => hasher.update(b"MISSING"),
            }
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// 单文件校验和
    pub fn checksum_of(&self, path: &Path) -> Option<String> {
        self.files.get(path).map(|c| content_checksum(c.as_deref()))
    }

    pub fn checksums(&self) -> BTreeMap<PathBuf, String> {
        self.files
            .iter()
            .map(|(path, content)| (path.clone(), content_checksum(content.as_deref())))
            .collect()
    }
}

// ==================== 指纹账本 ====================

/// 引擎自身写入（或已接受）的每个原生文件的校验和
///
/// 监听器据此区分"引擎刚写的"与"外部写的"。
#[derive(Debug, Default)]
pub struct FingerprintLedger {
    entries: RwLock<HashMap<ToolId, BTreeMap<PathBuf, String>>>,
}

impl FingerprintLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用新的校验和替换工具的记录
    pub fn record(&self, tool_id: ToolId, checksums: BTreeMap<PathBuf, String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tool_id, checksums);
    }

    /// 只记录单个文件（监听器首次见到某文件时作为基线）
    pub fn record_path(&self, tool_id: ToolId, path: &Path, checksum: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(tool_id)
            .or_default()
            .insert(path.to_path_buf(), checksum);
    }

    pub fn expected(&self, tool_id: ToolId, path: &Path) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tool_id)
            .and_then(|m| m.get(path).cloned())
    }

    pub fn for_tool(&self, tool_id: ToolId) -> BTreeMap<PathBuf, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tool_id)
            .cloned()
            .unwrap_or_default()
    }
}

// ==================== 适配器 trait ====================

pub trait NativeConfigAdapter: Send + Sync {
    fn tool(&self) -> &Tool;

    /// 从快照解析凭证；内容不符合预期格式时返回 `Parse`
    fn parse(&self, snapshot: &NativeSnapshot) -> SyncResult<Credentials>;

    /// 在 `base` 的基础上写入凭证，返回将要落盘的快照
    fn serialize(&self, base: &NativeSnapshot, creds: &Credentials) -> SyncResult<NativeSnapshot>;

    fn paths(&self) -> Vec<PathBuf> {
        self.tool().native_paths()
    }

    fn load(&self) -> SyncResult<NativeSnapshot> {
        NativeSnapshot::load(&self.paths())
    }

    fn read(&self) -> SyncResult<Credentials> {
        self.parse(&self.load()?)
    }

    /// 在 `base` 上写入 `creds` 后的指纹，原生内容与 Profile 按此比较
    fn fingerprint_with(&self, base: &NativeSnapshot, creds: &Credentials) -> SyncResult<String> {
        Ok(self.serialize(base, creds)?.fingerprint())
    }

    /// 写入凭证到原生文件
    ///
    /// 失败时磁盘保持写入前的内容，账本不变。
    fn write(&self, creds: &Credentials, ledger: &FingerprintLedger) -> SyncResult<NativeSnapshot> {
        let before = self.load()?;
        let after = self.serialize(&before, creds)?;
        commit_snapshot(&before, &after)?;
        ledger.record(self.tool().id, after.checksums());
        tracing::debug!(tool_id = %self.tool().id, "原生配置已写入");
        Ok(after)
    }
}

/// 把 `after` 落盘：先写全部临时文件，再依次 rename
///
/// 某次 rename 失败时，已替换的文件按 `before` 恢复。
pub fn commit_snapshot(before: &NativeSnapshot, after: &NativeSnapshot) -> SyncResult<()> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
    for path in after.paths() {
        let Some(content) = after.get(path) else {
            continue;
        };
        if before.get(path) == Some(content) {
            continue;
        }
        match write_temp(path, content) {
            Ok(temp) => staged.push((path.clone(), temp)),
            Err(err) => {
                discard_temps(&staged);
                return Err(SyncError::io(path, err));
            }
        }
    }

    for (index, (path, temp)) in staged.iter().enumerate() {
        if let Err(err) = fs::rename(temp, path) {
            rollback(before, &staged[..index]);
            discard_temps(&staged[index..]);
            return Err(SyncError::io(path, err));
        }
    }
    Ok(())
}

fn discard_temps(staged: &[(PathBuf, PathBuf)]) {
    for (_, temp) in staged {
        let _ = fs::remove_file(temp);
    }
}

fn rollback(before: &NativeSnapshot, replaced: &[(PathBuf, PathBuf)]) {
    for (path, _) in replaced {
        let result = match before.get(path) {
            Some(content) => atomic_write(path, content),
            None => fs::remove_file(path),
        };
        if let Err(err) = result {
            tracing::error!(path = %path.display(), error = %err, "回滚原生配置失败");
        }
    }
}

// ==================== 适配器集合 ====================

/// 三个工具的适配器
#[derive(Clone)]
pub struct Adapters {
    claude: Arc<dyn NativeConfigAdapter>,
    codex: Arc<dyn NativeConfigAdapter>,
    gemini: Arc<dyn NativeConfigAdapter>,
}

impl Adapters {
    pub fn for_home(home_dir: &Path) -> Self {
        Self {
            claude: Arc::new(ClaudeAdapter::new(Tool::in_home(ToolId::ClaudeCode, home_dir))),
            codex: Arc::new(CodexAdapter::new(Tool::in_home(ToolId::Codex, home_dir))),
            gemini: Arc::new(GeminiAdapter::new(Tool::in_home(ToolId::GeminiCli, home_dir))),
        }
    }

    pub fn get(&self, tool_id: ToolId) -> Arc<dyn NativeConfigAdapter> {
        match tool_id {
            ToolId::ClaudeCode => Arc::clone(&self.claude),
            ToolId::Codex => Arc::clone(&self.codex),
            ToolId::GeminiCli => Arc::clone(&self.gemini),
        }
    }
}

/// 取快照中的必需文件，不存在时返回 `Parse`
pub(crate) fn require_file<'a>(snapshot: &'a NativeSnapshot, path: &Path) -> SyncResult<&'a [u8]> {
    snapshot
        .get(path)
        .ok_or_else(|| SyncError::parse(path, "配置文件不存在"))
}
