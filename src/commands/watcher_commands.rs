//! 监听命令

use anyhow::Result;
use duckcoding_sync::{ReconciliationService, WatcherStatus};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::change_commands::describe_change;
use super::types::Output;

fn describe_status(status: &WatcherStatus) -> String {
    format!(
        "监听: {}  运行中: {}  文件通知: {}  轮询间隔: {}ms  待处理: {}",
        if status.enabled { "开启" } else { "关闭" },
        status.running,
        status.push_active,
        status.poll_interval_ms,
        status.pending
    )
}

pub async fn show_status(service: &ReconciliationService, out: Output) -> Result<()> {
    out.emit(&service.watcher_status(), describe_status)
}

pub async fn configure(
    service: &ReconciliationService,
    out: Output,
    enabled: Option<bool>,
    interval_ms: Option<u64>,
) -> Result<()> {
    service.set_watch_settings(enabled, interval_ms).await?;
    // 设置已写入 config.json；本进程不常驻，开启监听的效果由 `watch` 体现
    service.stop_watching().await;
    out.emit(&service.watcher_status(), describe_status)
}

/// 前台运行监听，Ctrl-C 退出
///
/// 同时按配置自动启动透明代理。
pub async fn run_foreground(service: &ReconciliationService, out: Output) -> Result<()> {
    let mut rx = service.subscribe();
    if !service.start_watching_if_enabled() {
        anyhow::bail!("已在全局配置中关闭监听，可用 `watch config --enabled true` 开启");
    }

    let report = service.auto_start_proxies().await?;
    debug!(started = ?report.started, "前台监听已启动");
    if !out.json {
        eprintln!("{}", describe_status(&service.watcher_status()));
        eprintln!("按 Ctrl-C 退出");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = rx.recv() => match received {
                Ok(change) => out.event(&change, describe_change)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "事件过多，部分通知已丢弃"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    service.stop_watching().await;
    Ok(())
}
