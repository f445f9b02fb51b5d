//! Profile 切换后的透明代理同步
//!
//! 代理启用且运行时，把新激活 Profile 的凭证热更新到运行中的实例，
//! 同时写回 proxy.json 的 `real_*` 字段，下次启动沿用。

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::proxy_manager::ProxyControl;
use crate::core::{SyncError, SyncResult};
use crate::models::{ToolId, ToolProxyConfig};
use crate::services::profile_manager::Credentials;
use crate::services::proxy_config_manager::ProxyConfigManager;
use crate::utils::run_blocking;

/// 切换后的代理同步结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProxySyncStatus {
    /// 代理未启用或未运行，无需推送
    NotApplicable,
    Synced,
    /// 文件已切换，代理推送失败（部分成功）
    Failed { reason: String },
}

pub struct ProxySyncBridge {
    control: Arc<dyn ProxyControl>,
    configs: Arc<ProxyConfigManager>,
}

impl ProxySyncBridge {
    pub fn new(control: Arc<dyn ProxyControl>, configs: Arc<ProxyConfigManager>) -> Self {
        Self { control, configs }
    }

    async fn load_config(&self, tool_id: ToolId) -> SyncResult<ToolProxyConfig> {
        let configs = Arc::clone(&self.configs);
        run_blocking(move || configs.get_config(tool_id)).await
    }

    async fn persist_upstream(
        &self,
        tool_id: ToolId,
        profile_name: &str,
        credentials: &Credentials,
    ) -> SyncResult<()> {
        let configs = Arc::clone(&self.configs);
        let profile_name = profile_name.to_string();
        let credentials = credentials.clone();
        run_blocking(move || {
            configs
                .modify_config(tool_id, |cfg| {
                    cfg.real_api_key = Some(credentials.api_key);
                    cfg.real_base_url = Some(credentials.base_url);
                    cfg.real_profile_name = Some(profile_name);
                })
                .map(|_| ())
        })
        .await
    }

    /// 推送凭证到运行中的代理
    ///
    /// 代理未运行时返回 `ProxyUnavailable`，不会启动或重启代理。
    pub async fn push(
        &self,
        tool_id: ToolId,
        profile_name: &str,
        credentials: &Credentials,
    ) -> SyncResult<()> {
        if !self.control.status(tool_id).await.running {
            return Err(SyncError::ProxyUnavailable(format!("{tool_id} 代理未运行")));
        }

        self.control
            .apply_live_config(tool_id, credentials, Some(profile_name))
            .await
            .map_err(|e| SyncError::ProxyUnavailable(format!("{e:#}")))?;

        self.persist_upstream(tool_id, profile_name, credentials)
            .await?;

        tracing::info!(tool_id = %tool_id, profile = %profile_name, "代理凭证已同步");
        Ok(())
    }

    /// 切换成功后调用：按代理配置决定是否推送
    ///
    /// 启用但未运行的代理只更新 proxy.json，不视为失败。
    pub async fn sync_after_switch(
        &self,
        tool_id: ToolId,
        profile_name: &str,
        credentials: &Credentials,
    ) -> ProxySyncStatus {
        let config = match self.load_config(tool_id).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(tool_id = %tool_id, error = %e, "读取代理配置失败");
                return ProxySyncStatus::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if !config.enabled {
            return ProxySyncStatus::NotApplicable;
        }

        if !self.control.status(tool_id).await.running {
            if let Err(e) = self
                .persist_upstream(tool_id, profile_name, credentials)
                .await
            {
                tracing::warn!(tool_id = %tool_id, error = %e, "更新代理配置失败");
            }
            return ProxySyncStatus::NotApplicable;
        }

        match self.push(tool_id, profile_name, credentials).await {
            Ok(()) => ProxySyncStatus::Synced,
            Err(e) => {
                tracing::warn!(
                    tool_id = %tool_id,
                    profile = %profile_name,
                    error = %e,
                    "代理同步失败"
                );
                ProxySyncStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
