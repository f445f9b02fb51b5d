// lib.rs - 暴露同步引擎给 CLI 使用

pub mod core;
pub mod data;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

use std::path::{Path, PathBuf};

pub use core::{SyncError, SyncResult};
pub use models::*;
pub use services::config::{ExternalConfigChange, ImportResult, WatcherStatus};
pub use services::legacy_cleanup::{LegacyCleanup, MigrationRecord};
pub use services::profile_manager::{
    ActiveConfig, Credentials, Profile, ProfileDescriptor, ProfileStore,
};
pub use services::proxy::{ProxyControl, ProxyManager, ProxyStatus, ProxySyncStatus};
pub use services::reconciliation::{
    ProxyConfigUpdate, ReconciliationService, SaveOutcome, SwitchOutcome,
};

// 重新导出常用类型
pub use anyhow::{Context, Result};

/// 路径注入点：用户主目录（原生配置所在）与 DuckCoding 配置目录
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub home_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl SyncContext {
    pub fn new(home_dir: impl AsRef<Path>, config_dir: impl AsRef<Path>) -> Self {
        Self {
            home_dir: home_dir.as_ref().to_path_buf(),
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// 从运行环境解析：`dirs::home_dir()` + `DUCKCODING_CONFIG_DIR` / `~/.duckcoding`
    pub fn from_env() -> Result<Self> {
        let home_dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("无法获取用户主目录"))?;
        Ok(Self {
            home_dir,
            config_dir: utils::config::config_dir()?,
        })
    }

    /// 指定配置目录（不存在时创建），主目录仍取自运行环境
    pub fn with_config_dir(config_dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("创建配置目录失败: {config_dir:?}"))?;
        let home_dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("无法获取用户主目录"))?;
        Ok(Self::new(home_dir, config_dir))
    }
}
