//! 透明代理命令

use anyhow::Result;
use duckcoding_sync::services::profile_manager::mask_api_key;
use duckcoding_sync::{ProxyConfigUpdate, ReconciliationService, ToolId, ToolProxyConfig};
use serde::Serialize;

use super::types::Output;

#[derive(Serialize)]
struct ProxyView {
    tool_id: ToolId,
    running: bool,
    port: Option<u16>,
    #[serde(flatten)]
    config: ToolProxyConfig,
}

fn masked(mut config: ToolProxyConfig) -> ToolProxyConfig {
    config.local_api_key = config.local_api_key.as_deref().map(mask_api_key);
    config.real_api_key = config.real_api_key.as_deref().map(mask_api_key);
    config
}

fn describe_config(tool_id: ToolId, config: &ToolProxyConfig) -> String {
    format!(
        "{tool_id}: enabled={} port={} auto_start={} allow_public={} profile={}",
        config.enabled,
        config.port,
        config.auto_start,
        config.allow_public,
        config.real_profile_name.as_deref().unwrap_or("-")
    )
}

pub async fn status(
    service: &ReconciliationService,
    out: Output,
    tool: Option<ToolId>,
) -> Result<()> {
    let tools = match tool {
        Some(tool_id) => vec![tool_id],
        None => ToolId::ALL.to_vec(),
    };

    let mut views = Vec::new();
    for tool_id in tools {
        let status = service.proxy_status(tool_id).await;
        views.push(ProxyView {
            tool_id,
            running: status.running,
            port: status.port,
            config: masked(service.get_proxy_config(tool_id).await?),
        });
    }

    out.emit(views.as_slice(), |views| {
        views
            .iter()
            .map(|v| format!("{}  running={}", describe_config(v.tool_id, &v.config), v.running))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub async fn configure(
    service: &ReconciliationService,
    out: Output,
    tool_id: ToolId,
    update: ProxyConfigUpdate,
) -> Result<()> {
    let config = masked(service.update_proxy_config(tool_id, update).await?);
    out.emit(&config, |c| describe_config(tool_id, c))
}

/// 前台运行代理，Ctrl-C 停止
pub async fn start_foreground(
    service: &ReconciliationService,
    out: Output,
    tool_id: ToolId,
) -> Result<()> {
    service
        .update_proxy_config(
            tool_id,
            ProxyConfigUpdate {
                enabled: Some(true),
                ..Default::default()
            },
        )
        .await?;
    let status = service.start_proxy(tool_id).await?;
    out.event(&status, |s| {
        format!(
            "{tool_id} 透明代理已启动: 127.0.0.1:{}（Ctrl-C 停止）",
            s.port.unwrap_or_default()
        )
    })?;

    tokio::signal::ctrl_c().await?;
    service.stop_proxy(tool_id).await?;
    Ok(())
}

/// 关闭代理：写入 `enabled = false`，并停止本进程中的实例
pub async fn stop(service: &ReconciliationService, out: Output, tool_id: ToolId) -> Result<()> {
    service.stop_proxy(tool_id).await?;
    let config = service
        .update_proxy_config(
            tool_id,
            ProxyConfigUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await?;
    out.emit(&masked(config), |c| describe_config(tool_id, c))
}
