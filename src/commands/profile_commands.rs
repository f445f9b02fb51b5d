//! Profile 管理命令

use anyhow::Result;
use duckcoding_sync::services::profile_manager::{mask_api_key, ActiveConfig, Credentials};
use duckcoding_sync::services::proxy::ProxySyncStatus;
use duckcoding_sync::{ReconciliationService, ToolId};

use super::types::Output;

pub async fn list_profiles(
    service: &ReconciliationService,
    out: Output,
    tool_id: ToolId,
) -> Result<()> {
    let profiles = service.list_profiles(tool_id).await?;
    out.emit(&profiles, |profiles| {
        if profiles.is_empty() {
            return format!("{tool_id} 暂无 Profile");
        }
        profiles
            .iter()
            .map(|p| {
                let marker = if p.is_active { "*" } else { " " };
                let drift = if p.has_drift { "  (已被外部修改)" } else { "" };
                format!("{marker} {}  {}  {}{drift}", p.name, p.api_key_preview, p.base_url)
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn describe_active(active: &ActiveConfig) -> String {
    let name = active.profile_name.as_deref().unwrap_or("(custom)");
    let mut text = format!(
        "{}: {name}\n  api_key:  {}\n  base_url: {}",
        active.tool_id,
        mask_api_key(&active.api_key),
        active.base_url
    );
    if let Some(provider) = &active.provider {
        text.push_str(&format!("\n  provider: {provider}"));
    }
    text
}

pub async fn show_active(
    service: &ReconciliationService,
    out: Output,
    tool_id: ToolId,
) -> Result<()> {
    let active = service.get_active_config(tool_id).await?;
    out.emit(&active, describe_active)
}

pub async fn save_profile(
    service: &ReconciliationService,
    out: Output,
    tool_id: ToolId,
    name: &str,
    creds: Credentials,
) -> Result<()> {
    let outcome = service.save_profile(tool_id, name, creds).await?;
    out.emit(&outcome, |o| {
        let mut text = format!("已保存 Profile {} / {}", tool_id, o.profile.name);
        if o.reapplied {
            text.push_str("（当前激活，已重新写入原生配置）");
        }
        text
    })
}

pub async fn switch_profile(
    service: &ReconciliationService,
    out: Output,
    tool_id: ToolId,
    name: &str,
) -> Result<()> {
    let outcome = service.switch_profile(tool_id, name).await?;
    out.emit(&outcome, |o| {
        let proxy = match &o.proxy_sync {
            ProxySyncStatus::NotApplicable => String::new(),
            ProxySyncStatus::Synced => "\n透明代理已同步".to_string(),
            ProxySyncStatus::Failed { reason } => {
                format!("\nProfile 已切换，但透明代理同步失败: {reason}")
            }
        };
        let state = match &o.state_error {
            Some(err) => format!("\n切换状态未能保存，下次检测可能误报外部变更: {err}"),
            None => String::new(),
        };
        format!(
            "已切换到 {}{proxy}{state}\n{}",
            name,
            describe_active(&o.active)
        )
    })
}

pub async fn delete_profile(
    service: &ReconciliationService,
    out: Output,
    tool_id: ToolId,
    name: &str,
) -> Result<()> {
    service.delete_profile(tool_id, name).await?;
    out.emit(
        &serde_json::json!({ "tool_id": tool_id, "deleted": name }),
        |_| format!("已删除 Profile {tool_id} / {name}（原生配置未修改）"),
    )
}
