//! Profile 与外部变更协调服务
//!
//! 对外的唯一入口：切换、保存、删除 Profile，处理外部变更，控制监听器与透明代理。
//! 同一工具的写操作经 [`ToolLocks`] 串行；所有文件 I/O 在阻塞线程池执行。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::core::{SyncError, SyncResult};
use crate::models::{Tool, ToolId, ToolProxyConfig};
use crate::services::config::{
    ChangeWatcher, ExternalConfigChange, ImportResult, WatchSettings, WatcherStatus,
};
use crate::services::legacy_cleanup::{
    CleanupResult, LegacyCleanup, MigrateResult, MigrationRecord,
};
use crate::services::native_config::{Adapters, FingerprintLedger};
use crate::services::profile_manager::{
    resolve_snapshot, ActiveConfig, ActiveConfigResolver, Credentials, Profile,
    ProfileDescriptor, ProfileStore,
};
use crate::services::proxy::{ProxyControl, ProxyStatus, ProxySyncBridge, ProxySyncStatus};
use crate::services::proxy_config_manager::ProxyConfigManager;
use crate::services::tool_lock::ToolLocks;
use crate::utils::config::{global_config_path, load_global_config_or_default, write_global_config};
use crate::utils::file_helpers::content_checksum;
use crate::utils::run_blocking;
use crate::SyncContext;

/// 切换结果
///
/// 原生文件写入成功即视为切换成功；其后的状态持久化与代理同步可能单独失败（部分成功）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchOutcome {
    pub active: ActiveConfig,
    pub proxy_sync: ProxySyncStatus,
    /// active.json 未能更新（基线或最近切换记录），下次启动可能把本次写入误报为外部变更
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub profile: Profile,
    /// 该 Profile 为当前激活项，已重新写入原生配置
    pub reapplied: bool,
    pub proxy_sync: ProxySyncStatus,
}

/// 代理配置的部分更新，`None` 字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfigUpdate {
    pub enabled: Option<bool>,
    pub port: Option<u16>,
    pub local_api_key: Option<String>,
    pub allow_public: Option<bool>,
    pub auto_start: Option<bool>,
}

/// 自启动结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoStartReport {
    pub started: Vec<ToolId>,
    pub failed: Vec<(ToolId, String)>,
}

pub struct ReconciliationService {
    config_dir: PathBuf,
    store: Arc<ProfileStore>,
    adapters: Adapters,
    resolver: Arc<ActiveConfigResolver>,
    ledger: Arc<FingerprintLedger>,
    locks: ToolLocks,
    watcher: Arc<ChangeWatcher>,
    proxy: Arc<dyn ProxyControl>,
    proxy_configs: Arc<ProxyConfigManager>,
    bridge: ProxySyncBridge,
    legacy: Arc<LegacyCleanup>,
}

fn config_error(config_dir: &Path, err: anyhow::Error) -> SyncError {
    SyncError::parse(global_config_path(config_dir), format!("{err:#}"))
}

impl ReconciliationService {
    /// 构建服务并从 active.json 恢复指纹账本
    ///
    /// 监听器按 config.json 初始化但不会自动启动，见 [`Self::start_watching_if_enabled`]。
    pub fn new(ctx: &SyncContext, proxy: Arc<dyn ProxyControl>) -> SyncResult<Self> {
        let global = load_global_config_or_default(&ctx.config_dir)
            .map_err(|e| config_error(&ctx.config_dir, e))?;

        let store = Arc::new(ProfileStore::new(&ctx.config_dir));
        let adapters = Adapters::for_home(&ctx.home_dir);
        let ledger = Arc::new(FingerprintLedger::new());
        let active = store.load_active()?;
        for tool_id in ToolId::ALL {
            ledger.record(tool_id, active.get(tool_id).native_checksums.clone());
        }

        let locks = ToolLocks::new();
        let watcher = Arc::new(ChangeWatcher::new(
            Tool::all_in(&ctx.home_dir),
            Arc::clone(&ledger),
            locks.clone(),
            Arc::clone(&store),
            WatchSettings {
                enabled: global.external_watch_enabled,
                poll_interval: global.poll_interval(),
            },
        ));

        let proxy_configs = Arc::new(ProxyConfigManager::new(&ctx.config_dir));
        let bridge = ProxySyncBridge::new(Arc::clone(&proxy), Arc::clone(&proxy_configs));

        Ok(Self {
            config_dir: ctx.config_dir.clone(),
            resolver: Arc::new(ActiveConfigResolver::new(
                Arc::clone(&store),
                adapters.clone(),
            )),
            store,
            adapters,
            ledger,
            locks,
            watcher,
            proxy,
            proxy_configs,
            bridge,
            legacy: Arc::new(LegacyCleanup::for_home(&ctx.home_dir)),
        })
    }

    /// 把工具当前磁盘内容记为引擎已接受的基线并持久化
    fn adopt_baseline(
        store: &ProfileStore,
        ledger: &FingerprintLedger,
        tool_id: ToolId,
        checksums: std::collections::BTreeMap<PathBuf, String>,
    ) -> SyncResult<()> {
        ledger.record(tool_id, checksums);
        store.set_native_checksums(tool_id, ledger.for_tool(tool_id))
    }

    // ==================== Profile 操作 ====================

    /// 切换到指定 Profile
    ///
    /// 写入失败时磁盘与 Profile 存储保持原状；写入成功后状态保存或代理同步失败只在结果中体现。
    pub async fn switch_profile(&self, tool_id: ToolId, name: &str) -> SyncResult<SwitchOutcome> {
        let _guard = self.locks.lock(tool_id).await;

        let store = Arc::clone(&self.store);
        let adapter = self.adapters.get(tool_id);
        let ledger = Arc::clone(&self.ledger);
        let resolver = Arc::clone(&self.resolver);
        let name = name.to_string();
        let (profile, active, state_error) = run_blocking(move || {
            let profile = store.get(tool_id, &name)?;
            let creds = profile.credentials();
            let written = adapter.write(&creds, &ledger)?;

            // 文件已切换，之后的失败不回滚，只在结果中体现
            let state_error = Self::adopt_baseline(&store, &ledger, tool_id, written.checksums())
                .and_then(|()| store.set_last_switched(tool_id, &profile.name))
                .err();
            if let Some(err) = &state_error {
                tracing::warn!(
                    tool_id = %tool_id,
                    profile = %profile.name,
                    error = %err,
                    "切换状态保存失败"
                );
            }
            let active = resolver.resolve(tool_id).unwrap_or_else(|err| {
                tracing::warn!(tool_id = %tool_id, error = %err, "切换后推导激活配置失败");
                ActiveConfig::from_credentials(tool_id, &creds, Some(profile.name.clone()))
            });
            Ok((profile, active, state_error.map(|e| e.to_string())))
        })
        .await?;

        // 原生文件已被覆盖，之前的外部变更不再有意义
        self.watcher.clear_tool(tool_id);
        tracing::info!(tool_id = %tool_id, profile = %profile.name, "已切换 Profile");

        let proxy_sync = self
            .bridge
            .sync_after_switch(tool_id, &profile.name, &profile.credentials())
            .await;

        Ok(SwitchOutcome {
            active,
            proxy_sync,
            state_error,
        })
    }

    /// 保存 Profile（upsert），若它正是当前激活项则重新写入原生配置
    pub async fn save_profile(
        &self,
        tool_id: ToolId,
        name: &str,
        creds: Credentials,
    ) -> SyncResult<SaveOutcome> {
        let _guard = self.locks.lock(tool_id).await;

        let store = Arc::clone(&self.store);
        let adapter = self.adapters.get(tool_id);
        let ledger = Arc::clone(&self.ledger);
        let resolver = Arc::clone(&self.resolver);
        let name = name.to_string();
        let (profile, reapplied) = run_blocking(move || {
            let was_active =
                resolver.resolve(tool_id)?.profile_name.as_deref() == Some(name.as_str());
            let profile = store.save(tool_id, &name, &creds)?;
            if was_active {
                let written = adapter.write(&profile.credentials(), &ledger)?;
                Self::adopt_baseline(&store, &ledger, tool_id, written.checksums())?;
                store.set_last_switched(tool_id, &profile.name)?;
            }
            Ok((profile, was_active))
        })
        .await?;

        let proxy_sync = if reapplied {
            self.watcher.clear_tool(tool_id);
            self.bridge
                .sync_after_switch(tool_id, &profile.name, &profile.credentials())
                .await
        } else {
            ProxySyncStatus::NotApplicable
        };

        Ok(SaveOutcome {
            profile,
            reapplied,
            proxy_sync,
        })
    }

    /// 删除 Profile，不修改原生配置
    pub async fn delete_profile(&self, tool_id: ToolId, name: &str) -> SyncResult<()> {
        let _guard = self.locks.lock(tool_id).await;

        let store = Arc::clone(&self.store);
        let name = name.to_string();
        run_blocking(move || {
            store.delete(tool_id, &name)?;
            store.clear_last_switched_if(tool_id, &name)
        })
        .await
    }

    /// 导入外部变更
    ///
    /// - `as_new_name` 有值：以当前原生内容创建新 Profile（同名已存在则失败）
    /// - 否则：覆盖当前激活的 Profile；原生内容已偏离时退回到最近切换的 Profile
    pub async fn import_external_change(
        &self,
        tool_id: ToolId,
        path: &Path,
        as_new_name: Option<String>,
    ) -> SyncResult<ImportResult> {
        let _guard = self.locks.lock(tool_id).await;

        let store = Arc::clone(&self.store);
        let adapter = self.adapters.get(tool_id);
        let ledger = Arc::clone(&self.ledger);
        let path = path.to_path_buf();
        let target_path = path.clone();
        let result = run_blocking(move || {
            if !adapter.tool().owns_path(&target_path) {
                return Err(SyncError::NotFound(format!(
                    "{} 未追踪的文件: {}",
                    tool_id,
                    target_path.display()
                )));
            }

            let snapshot = adapter.load()?;
            let creds = adapter.parse(&snapshot)?;
            let before_checksum = ledger.expected(tool_id, &target_path);

            let (profile_name, was_new) = match as_new_name {
                Some(name) => {
                    store.create(tool_id, &name, &creds)?;
                    (name, true)
                }
                None => {
                    let profiles = store.list(tool_id)?;
                    let hint = store.sync_state(tool_id)?.last_switched;
                    let resolved =
                        resolve_snapshot(adapter.as_ref(), &snapshot, &profiles, hint.as_ref())?;
                    let target = resolved
                        .profile_name
                        .or_else(|| {
                            hint.map(|h| h.profile)
                                .filter(|n| profiles.iter().any(|p| &p.name == n))
                        })
                        .ok_or(SyncError::NoActiveProfile(tool_id))?;
                    store.replace(tool_id, &target, &creds)?;
                    (target, false)
                }
            };

            Self::adopt_baseline(&store, &ledger, tool_id, snapshot.checksums())?;
            store.set_last_switched(tool_id, &profile_name)?;

            Ok(ImportResult {
                profile_name,
                was_new,
                replaced: !was_new,
                before_checksum,
                checksum: snapshot
                    .checksum_of(&target_path)
                    .unwrap_or_else(|| content_checksum(None)),
            })
        })
        .await?;

        self.watcher.clear_path(tool_id, &path);
        tracing::info!(
            tool_id = %tool_id,
            path = %path.display(),
            profile = %result.profile_name,
            was_new = result.was_new,
            "已导入外部变更"
        );
        Ok(result)
    }

    /// 忽略外部变更：清除待处理项，并以当前内容作为新基线
    ///
    /// 返回清除的条目数。
    pub async fn acknowledge_change(&self, tool_id: ToolId) -> SyncResult<usize> {
        let _guard = self.locks.lock(tool_id).await;

        let store = Arc::clone(&self.store);
        let adapter = self.adapters.get(tool_id);
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || {
            let snapshot = adapter.load()?;
            Self::adopt_baseline(&store, &ledger, tool_id, snapshot.checksums())
        })
        .await?;

        let cleared = self.watcher.clear_tool(tool_id);
        tracing::info!(tool_id = %tool_id, cleared, "已忽略外部变更");
        Ok(cleared)
    }

    pub async fn list_profiles(&self, tool_id: ToolId) -> SyncResult<Vec<ProfileDescriptor>> {
        let store = Arc::clone(&self.store);
        let resolver = Arc::clone(&self.resolver);
        run_blocking(move || {
            let profiles = store.list(tool_id)?;
            let active = resolver.resolve(tool_id)?;
            let hint = store.sync_state(tool_id)?.last_switched;
            Ok(profiles
                .iter()
                .map(|p| ProfileDescriptor::new(p, &active, hint.as_ref()))
                .collect())
        })
        .await
    }

    pub async fn get_active_config(&self, tool_id: ToolId) -> SyncResult<ActiveConfig> {
        let resolver = Arc::clone(&self.resolver);
        run_blocking(move || resolver.resolve(tool_id)).await
    }

    pub fn get_pending_changes(&self) -> Vec<ExternalConfigChange> {
        self.watcher.pending()
    }

    /// 手动执行一轮外部变更检测
    pub async fn detect_external_changes(&self) -> SyncResult<Vec<ExternalConfigChange>> {
        let watcher = Arc::clone(&self.watcher);
        run_blocking(move || Ok(watcher.detect_now())).await
    }

    // ==================== 监听器 ====================

    pub fn subscribe(&self) -> broadcast::Receiver<ExternalConfigChange> {
        self.watcher.subscribe()
    }

    pub fn watcher_status(&self) -> WatcherStatus {
        self.watcher.status()
    }

    /// 更新监听设置并写入 config.json，立即对运行中的监听器生效
    pub async fn set_watch_settings(
        &self,
        enabled: Option<bool>,
        poll_interval_ms: Option<u64>,
    ) -> SyncResult<WatcherStatus> {
        let config_dir = self.config_dir.clone();
        let global = run_blocking(move || {
            let mut global = load_global_config_or_default(&config_dir)
                .map_err(|e| config_error(&config_dir, e))?;
            if let Some(enabled) = enabled {
                global.external_watch_enabled = enabled;
            }
            if let Some(ms) = poll_interval_ms {
                global.external_poll_interval_ms = ms;
            }
            write_global_config(&config_dir, &global).map_err(|e| config_error(&config_dir, e))?;
            Ok(global)
        })
        .await?;

        self.watcher
            .apply_settings(WatchSettings {
                enabled: global.external_watch_enabled,
                poll_interval: global.poll_interval(),
            })
            .await;
        Ok(self.watcher.status())
    }

    /// 按当前设置启动监听（需在 tokio 运行时内调用）
    pub fn start_watching_if_enabled(&self) -> bool {
        if self.watcher.settings().enabled {
            self.watcher.start();
            true
        } else {
            false
        }
    }

    pub async fn stop_watching(&self) {
        self.watcher.stop().await;
    }

    // ==================== 透明代理 ====================

    pub async fn proxy_status(&self, tool_id: ToolId) -> ProxyStatus {
        self.proxy.status(tool_id).await
    }

    pub async fn get_proxy_config(&self, tool_id: ToolId) -> SyncResult<ToolProxyConfig> {
        let configs = Arc::clone(&self.proxy_configs);
        run_blocking(move || configs.get_config(tool_id)).await
    }

    /// 更新代理配置；端口与绑定地址变化需重启代理后生效
    pub async fn update_proxy_config(
        &self,
        tool_id: ToolId,
        update: ProxyConfigUpdate,
    ) -> SyncResult<ToolProxyConfig> {
        let configs = Arc::clone(&self.proxy_configs);
        let config = run_blocking(move || {
            configs.modify_config(tool_id, |cfg| {
                if let Some(enabled) = update.enabled {
                    cfg.enabled = enabled;
                }
                if let Some(port) = update.port {
                    cfg.port = port;
                }
                if let Some(key) = update.local_api_key {
                    cfg.local_api_key = Some(key).filter(|k| !k.is_empty());
                }
                if let Some(allow_public) = update.allow_public {
                    cfg.allow_public = allow_public;
                }
                if let Some(auto_start) = update.auto_start {
                    cfg.auto_start = auto_start;
                }
            })
        })
        .await?;

        if self.proxy.status(tool_id).await.running {
            tracing::info!(tool_id = %tool_id, "代理配置已保存，端口等设置在重启代理后生效");
        }
        Ok(config)
    }

    /// 启动代理，上游缺失时取当前激活的 Profile
    pub async fn start_proxy(&self, tool_id: ToolId) -> SyncResult<ProxyStatus> {
        let mut config = self.get_proxy_config(tool_id).await?;

        if !config.has_upstream() {
            let store = Arc::clone(&self.store);
            let resolver = Arc::clone(&self.resolver);
            let active = run_blocking(move || {
                let active = resolver.resolve(tool_id)?;
                match active.profile_name {
                    Some(name) => store.find(tool_id, &name),
                    None => Ok(None),
                }
            })
            .await?;
            if let Some(profile) = active {
                config.real_api_key = Some(profile.api_key);
                config.real_base_url = Some(profile.base_url);
                config.real_profile_name = Some(profile.name);
            }
        }

        self.proxy
            .start(tool_id, config)
            .await
            .map_err(|e| SyncError::ProxyUnavailable(format!("{e:#}")))?;
        Ok(self.proxy.status(tool_id).await)
    }

    pub async fn stop_proxy(&self, tool_id: ToolId) -> SyncResult<()> {
        self.proxy
            .stop(tool_id)
            .await
            .map_err(|e| SyncError::ProxyUnavailable(format!("{e:#}")))
    }

    /// 启动所有 `enabled && auto_start` 且配置了保护密钥的代理
    pub async fn auto_start_proxies(&self) -> SyncResult<AutoStartReport> {
        let configs = Arc::clone(&self.proxy_configs);
        let proxy_store = run_blocking(move || configs.load_proxy_store()).await?;

        let mut report = AutoStartReport {
            started: Vec::new(),
            failed: Vec::new(),
        };

        for tool_id in ToolId::ALL {
            let tool_config = proxy_store.get_config(tool_id);
            if !tool_config.enabled || !tool_config.auto_start {
                continue;
            }
            if tool_config.local_api_key.is_none() {
                tracing::warn!(tool_id = %tool_id, "未配置保护密钥，跳过自启动");
                continue;
            }

            tracing::info!(tool_id = %tool_id, port = tool_config.port, "自动启动代理");
            match self.start_proxy(tool_id).await {
                Ok(_) => report.started.push(tool_id),
                Err(e) => {
                    tracing::error!(tool_id = %tool_id, error = %e, "代理启动失败");
                    report.failed.push((tool_id, e.to_string()));
                }
            }
        }

        if report.started.is_empty() && report.failed.is_empty() {
            tracing::debug!("没有配置自启动的代理");
        } else {
            tracing::info!(
                started = report.started.len(),
                failed = report.failed.len(),
                "自启动代理完成"
            );
        }
        Ok(report)
    }

    // ==================== 旧版备份 ====================

    pub async fn scan_legacy(&self) -> SyncResult<Vec<MigrationRecord>> {
        let legacy = Arc::clone(&self.legacy);
        run_blocking(move || legacy.scan()).await
    }

    pub async fn clean_legacy(
        &self,
        records: Vec<MigrationRecord>,
    ) -> SyncResult<Vec<CleanupResult>> {
        let legacy = Arc::clone(&self.legacy);
        run_blocking(move || Ok(legacy.clean(&records))).await
    }

    pub async fn migrate_legacy(
        &self,
        records: Vec<MigrationRecord>,
    ) -> SyncResult<Vec<MigrateResult>> {
        let legacy = Arc::clone(&self.legacy);
        let store = Arc::clone(&self.store);
        let adapters = self.adapters.clone();
        run_blocking(move || Ok(legacy.migrate(&records, &store, &adapters))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::proxy::ProxyManager;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// 报告运行中、但拒绝热更新的代理
    struct UnresponsiveProxy;

    #[async_trait]
    impl ProxyControl for UnresponsiveProxy {
        async fn start(&self, _tool_id: ToolId, _config: ToolProxyConfig) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self, _tool_id: ToolId) -> anyhow::Result<()> {
            Ok(())
        }

        async fn status(&self, _tool_id: ToolId) -> ProxyStatus {
            ProxyStatus {
                running: true,
                port: Some(8787),
            }
        }

        async fn apply_live_config(
            &self,
            tool_id: ToolId,
            _credentials: &Credentials,
            _profile_name: Option<&str>,
        ) -> anyhow::Result<()> {
            anyhow::bail!("{tool_id} 代理无响应")
        }
    }

    struct Harness {
        home: TempDir,
        config: TempDir,
        proxy: Arc<ProxyManager>,
        service: ReconciliationService,
    }

    impl Harness {
        fn new() -> Self {
            let home = TempDir::new().unwrap();
            let config = TempDir::new().unwrap();
            let ctx = SyncContext::new(home.path(), config.path());
            let proxy = Arc::new(ProxyManager::new());
            let service =
                ReconciliationService::new(&ctx, Arc::clone(&proxy) as Arc<dyn ProxyControl>)
                    .unwrap();
            Self {
                home,
                config,
                proxy,
                service,
            }
        }

        fn settings_path(&self) -> PathBuf {
            self.home.path().join(".claude/settings.json")
        }

        fn write_settings(&self, key: &str, url: &str) {
            let path = self.settings_path();
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            let value = serde_json::json!({
                "env": {"ANTHROPIC_AUTH_TOKEN": key, "ANTHROPIC_BASE_URL": url},
                "theme": "dark"
            });
            fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
        }

        async fn seed(&self, name: &str, key: &str, url: &str) {
            self.service
                .save_profile(ToolId::ClaudeCode, name, Credentials::new(key, url))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_switch_writes_native_and_resolves() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;
        h.seed("home", "sk-home-123456", "https://home.example.com").await;

        let outcome = h
            .service
            .switch_profile(ToolId::ClaudeCode, "home")
            .await
            .unwrap();
        assert_eq!(outcome.active.profile_name.as_deref(), Some("home"));
        assert_eq!(outcome.active.api_key, "sk-home-123456");
        assert_eq!(outcome.proxy_sync, ProxySyncStatus::NotApplicable);

        let descriptors = h.service.list_profiles(ToolId::ClaudeCode).await.unwrap();
        let home = descriptors.iter().find(|d| d.name == "home").unwrap();
        assert!(home.is_active);
        assert!(!descriptors.iter().find(|d| d.name == "work").unwrap().is_active);

        // 引擎自己的写入不算外部变更
        assert!(h.service.detect_external_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_switch_to_missing_profile_leaves_file_untouched() {
        let h = Harness::new();
        h.write_settings("sk-original-1234", "https://original");
        let before = fs::read(h.settings_path()).unwrap();

        let err = h
            .service
            .switch_profile(ToolId::ClaudeCode, "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert_eq!(fs::read(h.settings_path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_external_edit_then_import_as_new() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;
        h.service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();

        h.write_settings("sk-edited-123456", "https://edited.example.com");
        let changes = h.service.detect_external_changes().await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, h.settings_path());

        let active = h.service.get_active_config(ToolId::ClaudeCode).await.unwrap();
        assert_eq!(active.profile_name, None);

        let result = h
            .service
            .import_external_change(ToolId::ClaudeCode, &h.settings_path(), Some("edited".into()))
            .await
            .unwrap();
        assert!(result.was_new);
        assert!(result.before_checksum.is_some());
        assert!(h.service.get_pending_changes().is_empty());

        let active = h.service.get_active_config(ToolId::ClaudeCode).await.unwrap();
        assert_eq!(active.profile_name.as_deref(), Some("edited"));
        assert!(h.service.detect_external_changes().await.unwrap().is_empty());

        // 同名导入失败
        h.write_settings("sk-again-1234567", "https://again");
        let err = h
            .service
            .import_external_change(ToolId::ClaudeCode, &h.settings_path(), Some("work".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidName(_)));
    }

    #[tokio::test]
    async fn test_import_overwrite_uses_last_switched_profile() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;
        h.service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();
        h.write_settings("sk-rotated-12345", "https://work.example.com");

        let result = h
            .service
            .import_external_change(ToolId::ClaudeCode, &h.settings_path(), None)
            .await
            .unwrap();
        assert_eq!(result.profile_name, "work");
        assert!(result.replaced);

        let profiles = h.service.list_profiles(ToolId::ClaudeCode).await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert!(profiles[0].is_active);
    }

    #[tokio::test]
    async fn test_import_overwrite_without_target_fails() {
        let h = Harness::new();
        h.write_settings("sk-custom-123456", "https://custom");

        let err = h
            .service
            .import_external_change(ToolId::ClaudeCode, &h.settings_path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoActiveProfile(ToolId::ClaudeCode)));
    }

    #[tokio::test]
    async fn test_import_untracked_path_is_not_found() {
        let h = Harness::new();
        let err = h
            .service
            .import_external_change(
                ToolId::ClaudeCode,
                &h.home.path().join(".claude/other.json"),
                Some("x".into()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_acknowledge_adopts_current_content() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;
        h.service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();
        h.write_settings("sk-ignored-12345", "https://ignored");
        assert_eq!(h.service.detect_external_changes().await.unwrap().len(), 1);

        let cleared = h.service.acknowledge_change(ToolId::ClaudeCode).await.unwrap();
        assert_eq!(cleared, 1);
        assert!(h.service.get_pending_changes().is_empty());
        assert!(h.service.detect_external_changes().await.unwrap().is_empty());
        let profiles = h.service.list_profiles(ToolId::ClaudeCode).await.unwrap();
        assert_eq!(profiles[0].api_key_preview, "sk-w...3456");
        assert!(profiles[0].has_drift);
    }

    #[tokio::test]
    async fn test_delete_active_profile_keeps_native_file() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;
        h.service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();
        let before = fs::read(h.settings_path()).unwrap();

        h.service
            .delete_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();
        assert_eq!(fs::read(h.settings_path()).unwrap(), before);

        let active = h.service.get_active_config(ToolId::ClaudeCode).await.unwrap();
        assert_eq!(active.profile_name, None);
        assert_eq!(active.api_key, "sk-work-123456");

        let err = h
            .service
            .delete_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_save_active_profile_reapplies() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;
        h.service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();

        let outcome = h
            .service
            .save_profile(
                ToolId::ClaudeCode,
                "work",
                Credentials::new("sk-work-rotated", ""),
            )
            .await
            .unwrap();
        assert!(outcome.reapplied);

        let active = h.service.get_active_config(ToolId::ClaudeCode).await.unwrap();
        assert_eq!(active.api_key, "sk-work-rotated");
        assert_eq!(active.base_url, "https://work.example.com");
        assert_eq!(active.profile_name.as_deref(), Some("work"));
        let settings = fs::read_to_string(h.settings_path()).unwrap();
        assert!(settings.contains("sk-work-rotated"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_switches_apply_in_call_order() {
        let h = Harness::new();
        h.seed("a", "sk-aaaa-123456", "https://a.example.com").await;
        h.seed("b", "sk-bbbb-123456", "https://b.example.com").await;
        h.service
            .switch_profile(ToolId::ClaudeCode, "a")
            .await
            .unwrap();

        // 并发读取方只应看到完整的文件
        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let path = h.settings_path();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut reads = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let content = fs::read(&path).unwrap();
                    serde_json::from_slice::<serde_json::Value>(&content).unwrap();
                    reads += 1;
                }
                reads
            })
        };

        for _ in 0..10 {
            let (first, second) = tokio::join!(
                h.service.switch_profile(ToolId::ClaudeCode, "a"),
                h.service.switch_profile(ToolId::ClaudeCode, "b"),
            );
            assert_eq!(first.unwrap().active.profile_name.as_deref(), Some("a"));
            assert_eq!(second.unwrap().active.profile_name.as_deref(), Some("b"));

            let active = h.service.get_active_config(ToolId::ClaudeCode).await.unwrap();
            assert_eq!(active.profile_name.as_deref(), Some("b"));
            assert_eq!(active.api_key, "sk-bbbb-123456");
        }

        stop.store(true, Ordering::Relaxed);
        assert!(reader.join().unwrap() > 0);
        assert!(h.service.detect_external_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_switch_is_idempotent() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;
        h.service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();
        let before = fs::read(h.settings_path()).unwrap();
        let mut rx = h.service.subscribe();

        let outcome = h
            .service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();
        assert_eq!(outcome.active.profile_name.as_deref(), Some("work"));
        assert_eq!(fs::read(h.settings_path()).unwrap(), before);

        assert!(h.service.detect_external_changes().await.unwrap().is_empty());
        assert!(h.service.get_pending_changes().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_switch_with_failed_proxy_push_is_partial_success() {
        let home = TempDir::new().unwrap();
        let config = TempDir::new().unwrap();
        let ctx = SyncContext::new(home.path(), config.path());
        let service = ReconciliationService::new(&ctx, Arc::new(UnresponsiveProxy)).unwrap();
        service
            .update_proxy_config(
                ToolId::ClaudeCode,
                ProxyConfigUpdate {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service
            .save_profile(
                ToolId::ClaudeCode,
                "work",
                Credentials::new("sk-work-123456", "https://work.example.com"),
            )
            .await
            .unwrap();

        let outcome = service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();
        match &outcome.proxy_sync {
            ProxySyncStatus::Failed { reason } => assert!(reason.contains("无响应")),
            other => panic!("unexpected proxy sync status: {other:?}"),
        }
        assert!(outcome.state_error.is_none());

        let settings = fs::read_to_string(home.path().join(".claude/settings.json")).unwrap();
        assert!(settings.contains("sk-work-123456"));
        let active = service.get_active_config(ToolId::ClaudeCode).await.unwrap();
        assert_eq!(active.profile_name.as_deref(), Some("work"));

        // 推送失败时不写回上游凭证
        let proxy_config = service.get_proxy_config(ToolId::ClaudeCode).await.unwrap();
        assert!(proxy_config.real_api_key.is_none());
    }

    #[tokio::test]
    async fn test_switch_reports_state_save_failure_after_write() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;

        // active.json 无法写入
        let active_path = h.config.path().join("active.json");
        if active_path.exists() {
            fs::remove_file(&active_path).unwrap();
        }
        fs::create_dir(&active_path).unwrap();

        let outcome = h
            .service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();
        assert!(outcome.state_error.is_some());
        assert_eq!(outcome.active.profile_name.as_deref(), Some("work"));
        assert_eq!(outcome.active.api_key, "sk-work-123456");

        let settings = fs::read_to_string(h.settings_path()).unwrap();
        assert!(settings.contains("sk-work-123456"));
        // 内存中的基线已更新，本次写入不算外部变更
        assert!(h.service.detect_external_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_switch_pushes_to_running_proxy() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;
        h.service
            .update_proxy_config(
                ToolId::ClaudeCode,
                ProxyConfigUpdate {
                    enabled: Some(true),
                    port: Some(0),
                    local_api_key: Some("local".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let status = h.service.start_proxy(ToolId::ClaudeCode).await.unwrap();
        assert!(status.running);

        let outcome = h
            .service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();
        assert_eq!(outcome.proxy_sync, ProxySyncStatus::Synced);

        let live = h.proxy.live_config(ToolId::ClaudeCode).await.unwrap();
        assert_eq!(live.real_api_key.as_deref(), Some("sk-work-123456"));
        assert_eq!(h.service.proxy_status(ToolId::ClaudeCode).await.port, status.port);

        h.service.stop_proxy(ToolId::ClaudeCode).await.unwrap();
        assert!(!h.service.proxy_status(ToolId::ClaudeCode).await.running);
    }

    #[tokio::test]
    async fn test_watch_settings_persist_and_apply() {
        let h = Harness::new();
        let status = h
            .service
            .set_watch_settings(Some(true), Some(100))
            .await
            .unwrap();
        assert!(status.enabled);
        assert!(status.running);
        assert_eq!(status.poll_interval_ms, 500);

        let status = h.service.set_watch_settings(Some(false), None).await.unwrap();
        assert!(!status.running);
        assert!(!h.service.start_watching_if_enabled());
    }

    #[tokio::test]
    async fn test_watcher_loop_notifies_subscribers() {
        let h = Harness::new();
        h.seed("work", "sk-work-123456", "https://work.example.com").await;
        h.service
            .switch_profile(ToolId::ClaudeCode, "work")
            .await
            .unwrap();

        let mut rx = h.service.subscribe();
        h.service
            .set_watch_settings(Some(true), Some(500))
            .await
            .unwrap();
        h.write_settings("sk-external-12345", "https://external");

        let change = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.tool_id, ToolId::ClaudeCode);
        h.service.stop_watching().await;
    }

    #[tokio::test]
    async fn test_ledger_is_hydrated_from_active_json() {
        let home = TempDir::new().unwrap();
        let config = TempDir::new().unwrap();
        let ctx = SyncContext::new(home.path(), config.path());

        {
            let service =
                ReconciliationService::new(&ctx, Arc::new(ProxyManager::new())).unwrap();
            service
                .save_profile(
                    ToolId::GeminiCli,
                    "g",
                    Credentials::new("g-key-123456", "https://g.example.com"),
                )
                .await
                .unwrap();
            service.switch_profile(ToolId::GeminiCli, "g").await.unwrap();
        }

        // 重启后仍能区分自身写入与外部修改
        let service = ReconciliationService::new(&ctx, Arc::new(ProxyManager::new())).unwrap();
        assert!(service.detect_external_changes().await.unwrap().is_empty());

        fs::write(home.path().join(".gemini/.env"), "GEMINI_API_KEY=other\n").unwrap();
        let changes = service.detect_external_changes().await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].tool_id, ToolId::GeminiCli);
    }
}
