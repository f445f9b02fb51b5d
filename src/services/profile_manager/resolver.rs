//! 当前激活配置推导
//!
//! 读取原生文件，计算规范指纹，与每个 Profile "写入后会得到的指纹"比较：
//! - 无匹配：custom / drift（`profile_name = None`）
//! - 唯一匹配：该 Profile
//! - 多个匹配：优先最近切换的 Profile，否则取插入顺序第一个
//!
//! 只读操作，从不写文件。

use super::manager::ProfileStore;
use super::types::{ActiveConfig, ActiveProfile, Profile};
use crate::core::SyncResult;
use crate::models::ToolId;
use crate::services::native_config::{Adapters, NativeConfigAdapter, NativeSnapshot};
use std::sync::Arc;

pub struct ActiveConfigResolver {
    store: Arc<ProfileStore>,
    adapters: Adapters,
}

impl ActiveConfigResolver {
    pub fn new(store: Arc<ProfileStore>, adapters: Adapters) -> Self {
        Self { store, adapters }
    }

    /// 推导工具当前的激活配置（阻塞 I/O）
    pub fn resolve(&self, tool_id: ToolId) -> SyncResult<ActiveConfig> {
        let adapter = self.adapters.get(tool_id);
        let snapshot = adapter.load()?;
        let profiles = self.store.list(tool_id)?;
        let hint = self.store.sync_state(tool_id)?.last_switched;
        resolve_snapshot(adapter.as_ref(), &snapshot, &profiles, hint.as_ref())
    }
}

/// 针对给定快照推导激活配置
pub fn resolve_snapshot(
    adapter: &dyn NativeConfigAdapter,
    snapshot: &NativeSnapshot,
    profiles: &[Profile],
    last_switched: Option<&ActiveProfile>,
) -> SyncResult<ActiveConfig> {
    let tool_id = adapter.tool().id;

    let creds = match adapter.parse(snapshot) {
        Ok(creds) => creds,
        Err(err) if err.is_parse() => {
            tracing::debug!(tool_id = %tool_id, error = %err, "原生配置无法解析，视为 custom");
            return Ok(ActiveConfig::unparseable(tool_id));
        }
        Err(err) => return Err(err),
    };
    let canonical = adapter.fingerprint_with(snapshot, &creds)?;

    let mut matches = Vec::new();
    for profile in profiles {
        if adapter.fingerprint_with(snapshot, &profile.credentials())? == canonical {
            matches.push(profile.name.as_str());
        }
    }

    let profile_name = match matches.as_slice() {
        [] => None,
        [only] => Some(only.to_string()),
        [first, ..] => {
            let preferred = last_switched
                .map(|ap| ap.profile.as_str())
                .filter(|name| matches.contains(name))
                .unwrap_or(*first);
            tracing::debug!(
                tool_id = %tool_id,
                candidates = ?matches,
                chosen = preferred,
                "多个 Profile 序列化结果相同"
            );
            Some(preferred.to_string())
        }
    };

    Ok(ActiveConfig::from_credentials(tool_id, &creds, profile_name))
}
