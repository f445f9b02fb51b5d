//! 阻塞任务辅助
//!
//! 文件 I/O 一律放到 tokio 阻塞线程池执行，避免阻塞异步调度线程。

use crate::core::{SyncError, SyncResult};
use std::io;
use std::path::PathBuf;

/// 在阻塞线程池中执行同步操作
///
/// 任务 panic 或被取消时映射为 `SyncError::Io`。
pub async fn run_blocking<T, F>(f: F) -> SyncResult<T>
where
    F: FnOnce() -> SyncResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(join_err) => Err(SyncError::io(
            PathBuf::new(),
            io::Error::other(format!("后台任务失败: {join_err}")),
        )),
    }
}
