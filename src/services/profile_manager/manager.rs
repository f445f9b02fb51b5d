//! ProfileStore 核心实现
//!
//! profiles.json / active.json 的读写都在 fs2 排他锁内完成"读-改-写"，
//! 避免 CLI 与后台监听同时修改时互相覆盖。

use super::types::*;
use crate::core::{SyncError, SyncResult};
use crate::data::{DataError, DataManager};
use crate::models::ToolId;
use chrono::Utc;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// 系统保留的 Profile 名称前缀
pub const RESERVED_PREFIX: &str = "dc_proxy_";

/// 校验 Profile 名称：非空且不使用保留前缀
pub fn validate_profile_name(name: &str) -> SyncResult<()> {
    if name.trim().is_empty() {
        return Err(SyncError::InvalidName("Profile 名称不能为空".to_string()));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(SyncError::InvalidName(format!(
            "Profile 名称不能以 '{}' 开头（系统保留前缀）",
            RESERVED_PREFIX
        )));
    }
    Ok(())
}

/// 写入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    /// 不存在则创建，存在则只更新非空字段
    Merge,
    /// 必须不存在
    CreateOnly,
    /// 必须存在，整体替换凭证
    Replace,
}

pub struct ProfileStore {
    data_manager: &'static DataManager,
    profiles_path: PathBuf,
    active_path: PathBuf,
}

impl ProfileStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            data_manager: DataManager::global(),
            profiles_path: config_dir.join("profiles.json"),
            active_path: config_dir.join("active.json"),
        }
    }

    fn acquire_lock(path: &Path) -> SyncResult<File> {
        let lock_path = path.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        let lock_file = File::create(&lock_path).map_err(|e| SyncError::io(&lock_path, e))?;
        // 阻塞等待其他写操作完成，锁在 lock_file drop 时自动释放
        lock_file.lock_exclusive().map_err(|source| DataError::Lock {
            path: lock_path.clone(),
            source,
        })?;
        Ok(lock_file)
    }

    pub fn load_profiles(&self) -> SyncResult<ProfilesStore> {
        Ok(self
            .data_manager
            .json()
            .read_typed(&self.profiles_path)?
            .unwrap_or_default())
    }

    fn update_profiles<T>(
        &self,
        f: impl FnOnce(&mut ProfilesStore) -> SyncResult<T>,
    ) -> SyncResult<T> {
        let _lock = Self::acquire_lock(&self.profiles_path)?;
        let mut store = self.load_profiles()?;
        let result = f(&mut store)?;
        store.metadata.last_updated = Utc::now();
        self.data_manager
            .json()
            .write_typed(&self.profiles_path, &store)?;
        Ok(result)
    }

    pub fn load_active(&self) -> SyncResult<ActiveStore> {
        Ok(self
            .data_manager
            .json()
            .read_typed(&self.active_path)?
            .unwrap_or_default())
    }

    fn update_active(&self, tool_id: ToolId, f: impl FnOnce(&mut ToolSyncState)) -> SyncResult<()> {
        let _lock = Self::acquire_lock(&self.active_path)?;
        let mut store = self.load_active()?;
        f(store.get_mut(tool_id));
        store.metadata.last_updated = Utc::now();
        self.data_manager
            .json()
            .write_typed(&self.active_path, &store)?;
        Ok(())
    }

    // ==================== Profile CRUD ====================

    /// 保存 Profile（upsert）
    ///
    /// 更新时只覆盖非空字段；创建时 API Key 和 Base URL 必须完整。
    pub fn save(&self, tool_id: ToolId, name: &str, creds: &Credentials) -> SyncResult<Profile> {
        self.put(tool_id, name, creds, SaveMode::Merge)
    }

    /// 创建新 Profile，名称已存在时返回 `InvalidName`
    pub fn create(&self, tool_id: ToolId, name: &str, creds: &Credentials) -> SyncResult<Profile> {
        self.put(tool_id, name, creds, SaveMode::CreateOnly)
    }

    /// 用新凭证整体替换已有 Profile
    pub fn replace(&self, tool_id: ToolId, name: &str, creds: &Credentials) -> SyncResult<Profile> {
        self.put(tool_id, name, creds, SaveMode::Replace)
    }

    fn put(
        &self,
        tool_id: ToolId,
        name: &str,
        creds: &Credentials,
        mode: SaveMode,
    ) -> SyncResult<Profile> {
        validate_profile_name(name)?;

        let profile = self.update_profiles(|store| {
            let profiles = store.tool_profiles_mut(tool_id);
            let now = Utc::now();

            if let Some(existing) = profiles.get_mut(name) {
                match mode {
                    SaveMode::CreateOnly => {
                        return Err(SyncError::InvalidName(format!(
                            "Profile 已存在: {} / {}",
                            tool_id, name
                        )));
                    }
                    SaveMode::Merge => {
                        if !creds.api_key.is_empty() {
                            existing.api_key = creds.api_key.clone();
                        }
                        if !creds.base_url.is_empty() {
                            existing.base_url = creds.base_url.clone();
                        }
                        if creds.provider.is_some() {
                            existing.provider = creds.provider.clone();
                        }
                    }
                    SaveMode::Replace => {
                        existing.api_key = creds.api_key.clone();
                        existing.base_url = creds.base_url.clone();
                        existing.provider = creds.provider.clone();
                    }
                }
                existing.updated_at = now;
                return Ok(Profile::from_record(tool_id, name, existing));
            }

            match mode {
                SaveMode::Replace => {
                    return Err(SyncError::NotFound(format!("Profile {} / {}", tool_id, name)));
                }
                SaveMode::Merge if creds.api_key.is_empty() || creds.base_url.is_empty() => {
                    return Err(SyncError::InvalidProfile(
                        "创建 Profile 时 API Key 和 Base URL 不能为空".to_string(),
                    ));
                }
                _ => {}
            }

            let record = ProfileRecord {
                api_key: creds.api_key.clone(),
                base_url: creds.base_url.clone(),
                provider: creds.provider.clone(),
                created_at: now,
                updated_at: now,
            };
            let profile = Profile::from_record(tool_id, name, &record);
            profiles.insert(name.to_string(), record);
            Ok(profile)
        })?;

        tracing::debug!(tool_id = %tool_id, profile = %name, "已保存 Profile");
        Ok(profile)
    }

    pub fn find(&self, tool_id: ToolId, name: &str) -> SyncResult<Option<Profile>> {
        let store = self.load_profiles()?;
        Ok(store
            .tool_profiles(tool_id)
            .get(name)
            .map(|record| Profile::from_record(tool_id, name, record)))
    }

    pub fn get(&self, tool_id: ToolId, name: &str) -> SyncResult<Profile> {
        self.find(tool_id, name)?
            .ok_or_else(|| SyncError::NotFound(format!("Profile {} / {}", tool_id, name)))
    }

    /// 删除 Profile，不触碰原生配置文件
    pub fn delete(&self, tool_id: ToolId, name: &str) -> SyncResult<()> {
        self.update_profiles(|store| {
            store
                .tool_profiles_mut(tool_id)
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| SyncError::NotFound(format!("Profile {} / {}", tool_id, name)))
        })?;
        tracing::info!(tool_id = %tool_id, profile = %name, "已删除 Profile");
        Ok(())
    }

    /// 按插入顺序列出 Profile（跳过系统保留 Profile）
    pub fn list(&self, tool_id: ToolId) -> SyncResult<Vec<Profile>> {
        let store = self.load_profiles()?;
        Ok(store
            .tool_profiles(tool_id)
            .iter()
            .filter(|(name, _)| !name.starts_with(RESERVED_PREFIX))
            .map(|(name, record)| Profile::from_record(tool_id, name, record))
            .collect())
    }

    // ==================== 同步状态 ====================

    pub fn sync_state(&self, tool_id: ToolId) -> SyncResult<ToolSyncState> {
        Ok(self.load_active()?.get(tool_id).clone())
    }

    pub fn set_last_switched(&self, tool_id: ToolId, name: &str) -> SyncResult<()> {
        self.update_active(tool_id, |state| {
            state.last_switched = Some(ActiveProfile {
                profile: name.to_string(),
                switched_at: Utc::now(),
            });
        })
    }

    /// 若"上次切换"提示指向该 Profile 则清除
    pub fn clear_last_switched_if(&self, tool_id: ToolId, name: &str) -> SyncResult<()> {
        self.update_active(tool_id, |state| {
            if state
                .last_switched
                .as_ref()
                .is_some_and(|ap| ap.profile == name)
            {
                state.last_switched = None;
            }
        })
    }

    pub fn set_native_checksums(
        &self,
        tool_id: ToolId,
        checksums: BTreeMap<PathBuf, String>,
    ) -> SyncResult<()> {
        self.update_active(tool_id, |state| state.native_checksums = checksums)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ProfileStore) {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_save_and_get() {
        let (_dir, store) = store();
        let creds = Credentials::new("sk-a", "https://a");
        let saved = store.save(ToolId::Codex, "work", &creds).unwrap();
        assert_eq!(saved.name, "work");

        let loaded = store.get(ToolId::Codex, "work").unwrap();
        assert_eq!(loaded.credentials(), creds);
        assert!(store.find(ToolId::ClaudeCode, "work").unwrap().is_none());
    }

    #[test]
    fn test_save_rejects_invalid_names() {
        let (_dir, store) = store();
        let creds = Credentials::new("k", "u");
        assert!(matches!(
            store.save(ToolId::Codex, "   ", &creds),
            Err(SyncError::InvalidName(_))
        ));
        assert!(matches!(
            store.save(ToolId::Codex, "dc_proxy_codex", &creds),
            Err(SyncError::InvalidName(_))
        ));
    }

    #[test]
    fn test_save_merges_non_empty_fields() {
        let (_dir, store) = store();
        store
            .save(ToolId::GeminiCli, "g", &Credentials::new("k1", "https://g"))
            .unwrap();
        let updated = store
            .save(ToolId::GeminiCli, "g", &Credentials::new("k2", ""))
            .unwrap();
        assert_eq!(updated.api_key, "k2");
        assert_eq!(updated.base_url, "https://g");
    }

    #[test]
    fn test_create_requires_complete_credentials() {
        let (_dir, store) = store();
        let err = store
            .save(ToolId::ClaudeCode, "x", &Credentials::new("", "https://a"))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidProfile(_)));
    }

    #[test]
    fn test_create_only_rejects_duplicates() {
        let (_dir, store) = store();
        let creds = Credentials::new("k", "u");
        store.create(ToolId::Codex, "dup", &creds).unwrap();
        assert!(matches!(
            store.create(ToolId::Codex, "dup", &creds),
            Err(SyncError::InvalidName(_))
        ));
    }

    #[test]
    fn test_update_keeps_list_order() {
        let (_dir, store) = store();
        for name in ["b", "a", "c"] {
            store
                .save(ToolId::Codex, name, &Credentials::new("k", "u"))
                .unwrap();
        }
        store
            .save(ToolId::Codex, "b", &Credentials::new("k2", ""))
            .unwrap();

        let names: Vec<_> = store
            .list(ToolId::Codex)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.delete(ToolId::Codex, "ghost"),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_hides_reserved_profiles() {
        let (dir, store) = store();
        let json = r#"{
            "version": "2.0.0",
            "codex": {
                "dc_proxy_codex": {"api_key":"k","base_url":"u","created_at":"2025-01-01T00:00:00Z","updated_at":"2025-01-01T00:00:00Z"},
                "work": {"api_key":"k","base_url":"u","created_at":"2025-01-01T00:00:00Z","updated_at":"2025-01-01T00:00:00Z"}
            },
            "metadata": {"last_updated": "2025-01-01T00:00:00Z"}
        }"#;
        fs::write(dir.path().join("profiles.json"), json).unwrap();

        let names: Vec<_> = store
            .list(ToolId::Codex)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["work"]);
    }

    #[test]
    fn test_last_switched_hint() {
        let (_dir, store) = store();
        store.set_last_switched(ToolId::Codex, "work").unwrap();
        assert_eq!(
            store
                .sync_state(ToolId::Codex)
                .unwrap()
                .last_switched
                .map(|ap| ap.profile),
            Some("work".to_string())
        );

        store.clear_last_switched_if(ToolId::Codex, "other").unwrap();
        assert!(store.sync_state(ToolId::Codex).unwrap().last_switched.is_some());

        store.clear_last_switched_if(ToolId::Codex, "work").unwrap();
        assert!(store.sync_state(ToolId::Codex).unwrap().last_switched.is_none());
    }

    #[test]
    fn test_checksums_persist_per_tool() {
        let (_dir, store) = store();
        let mut sums = BTreeMap::new();
        sums.insert(PathBuf::from("/h/.codex/auth.json"), "abc".to_string());
        store.set_native_checksums(ToolId::Codex, sums.clone()).unwrap();

        assert_eq!(store.sync_state(ToolId::Codex).unwrap().native_checksums, sums);
        assert!(store
            .sync_state(ToolId::GeminiCli)
            .unwrap()
            .native_checksums
            .is_empty());
    }
}
