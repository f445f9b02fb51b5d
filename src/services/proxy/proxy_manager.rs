// 多代理实例管理器
//
// ProxyManager 负责协调多个 ProxyInstance 的生命周期：
// - 启动和停止指定工具的代理
// - 管理所有代理实例的状态
// - 确保端口不冲突

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::headers::create_headers_processor;
use super::proxy_instance::ProxyInstance;
use crate::models::{ToolId, ToolProxyConfig};
use crate::services::profile_manager::Credentials;

/// 代理运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxyStatus {
    pub running: bool,
    pub port: Option<u16>,
}

/// 透明代理控制接口
///
/// 同步引擎只通过这组操作驱动代理，不关心请求转发细节。
#[async_trait]
pub trait ProxyControl: Send + Sync {
    async fn start(&self, tool_id: ToolId, config: ToolProxyConfig) -> Result<()>;

    async fn stop(&self, tool_id: ToolId) -> Result<()>;

    async fn status(&self, tool_id: ToolId) -> ProxyStatus;

    /// 热更新运行中代理的上游凭证，不重启监听端口
    async fn apply_live_config(
        &self,
        tool_id: ToolId,
        credentials: &Credentials,
        profile_name: Option<&str>,
    ) -> Result<()>;
}

/// 代理管理器
pub struct ProxyManager {
    instances: Arc<RwLock<HashMap<ToolId, ProxyInstance>>>,
}

impl ProxyManager {
    /// 创建新的代理管理器
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 启动指定工具的代理
    ///
    /// # 返回
    /// - `Ok(())`: 启动成功
    /// - `Err`: 已在运行、端口被其他代理占用或绑定失败
    pub async fn start_proxy(&self, tool_id: ToolId, config: ToolProxyConfig) -> Result<()> {
        let mut instances = self.instances.write().await;

        if let Some(instance) = instances.get(&tool_id) {
            if instance.is_running().await {
                anyhow::bail!("{tool_id} 代理已在运行");
            }
        }

        // 端口 0 由系统分配，不参与冲突检查
        if config.port != 0 {
            for (id, instance) in instances.iter() {
                if *id != tool_id && instance.port().await == Some(config.port) {
                    anyhow::bail!("端口 {} 已被 {id} 代理占用", config.port);
                }
            }
        }

        let processor = create_headers_processor(tool_id);
        let instance = ProxyInstance::new(tool_id, config, processor);
        instance
            .start()
            .await
            .with_context(|| format!("启动 {tool_id} 代理失败"))?;

        instances.insert(tool_id, instance);
        Ok(())
    }

    /// 停止指定工具的代理（未运行时直接返回成功）
    pub async fn stop_proxy(&self, tool_id: ToolId) -> Result<()> {
        let mut instances = self.instances.write().await;

        if let Some(instance) = instances.remove(&tool_id) {
            instance
                .stop()
                .await
                .with_context(|| format!("停止 {tool_id} 代理失败"))?;
        } else {
            tracing::warn!(tool_id = %tool_id, "代理未运行或不存在");
        }

        Ok(())
    }

    /// 停止所有运行中的代理
    pub async fn stop_all(&self) -> Result<()> {
        let mut instances = self.instances.write().await;

        for (tool_id, instance) in instances.drain() {
            if let Err(e) = instance.stop().await {
                tracing::error!(
                    tool_id = %tool_id,
                    error = ?e,
                    "停止代理失败"
                );
            }
        }

        Ok(())
    }

    /// 运行中实例的当前配置
    #[cfg(test)]
    pub(crate) async fn live_config(&self, tool_id: ToolId) -> Option<ToolProxyConfig> {
        let instances = self.instances.read().await;
        match instances.get(&tool_id) {
            Some(instance) => Some(instance.config().await),
            None => None,
        }
    }
}

impl Default for ProxyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxyControl for ProxyManager {
    async fn start(&self, tool_id: ToolId, config: ToolProxyConfig) -> Result<()> {
        self.start_proxy(tool_id, config).await
    }

    async fn stop(&self, tool_id: ToolId) -> Result<()> {
        self.stop_proxy(tool_id).await
    }

    async fn status(&self, tool_id: ToolId) -> ProxyStatus {
        let instances = self.instances.read().await;
        match instances.get(&tool_id) {
            Some(instance) if instance.is_running().await => ProxyStatus {
                running: true,
                port: instance.port().await,
            },
            _ => ProxyStatus::default(),
        }
    }

    async fn apply_live_config(
        &self,
        tool_id: ToolId,
        credentials: &Credentials,
        profile_name: Option<&str>,
    ) -> Result<()> {
        let instances = self.instances.read().await;

        let instance = instances
            .get(&tool_id)
            .with_context(|| format!("{tool_id} 代理未运行"))?;
        if !instance.is_running().await {
            anyhow::bail!("{tool_id} 代理未运行");
        }

        instance
            .apply_upstream(
                credentials.api_key.clone(),
                credentials.base_url.clone(),
                profile_name.map(str::to_string),
            )
            .await;
        Ok(())
    }
}
