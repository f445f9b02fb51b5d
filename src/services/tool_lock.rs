//! 按工具划分的互斥锁
//!
//! 切换、保存、导入、确认对同一工具串行执行；不同工具互不影响。
//! 监听器用 `try_lock` 探测，写入进行中时跳过该工具本轮检测。

use crate::models::ToolId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct ToolLocks {
    claude: Arc<Mutex<()>>,
    codex: Arc<Mutex<()>>,
    gemini: Arc<Mutex<()>>,
}

impl ToolLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, tool_id: ToolId) -> &Arc<Mutex<()>> {
        match tool_id {
            ToolId::ClaudeCode => &self.claude,
            ToolId::Codex => &self.codex,
            ToolId::GeminiCli => &self.gemini,
        }
    }

    /// 等待获取工具锁
    pub async fn lock(&self, tool_id: ToolId) -> OwnedMutexGuard<()> {
        Arc::clone(self.slot(tool_id)).lock_owned().await
    }

    /// 立即尝试获取工具锁，已被占用时返回 `None`
    pub fn try_lock(&self, tool_id: ToolId) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(self.slot(tool_id)).try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locks_are_per_tool() {
        let locks = ToolLocks::new();
        let _codex = locks.lock(ToolId::Codex).await;

        assert!(locks.try_lock(ToolId::Codex).is_none());
        assert!(locks.try_lock(ToolId::ClaudeCode).is_some());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let locks = ToolLocks::new();
        let other = locks.clone();
        let guard = locks.lock(ToolId::GeminiCli).await;
        assert!(other.try_lock(ToolId::GeminiCli).is_none());
        drop(guard);
        assert!(other.try_lock(ToolId::GeminiCli).is_some());
    }
}
