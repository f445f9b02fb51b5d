//! 配置文件外部变更检测与监听
//!
//! 两个触发源汇入同一个检测例程：
//! - `notify` 文件系统通知（监听原生文件所在目录，非递归）
//! - 定时轮询，补偿平台上丢失的通知
//!
//! 检测时把每个原生文件的校验和与 [`FingerprintLedger`] 中引擎自身写入的校验和比较，
//! 不一致即视为外部变更，写入待处理集合并广播。

use super::types::{ExternalConfigChange, WatchSettings, WatcherStatus};
use crate::models::{Tool, ToolId};
use crate::services::native_config::FingerprintLedger;
use crate::services::profile_manager::ProfileStore;
use crate::services::tool_lock::ToolLocks;
use crate::utils::file_helpers::{content_checksum, read_optional};
use anyhow::Result;
use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 超过该大小的文件不保存文本快照
const MAX_SNAPSHOT_BYTES: usize = 64 * 1024;
const EVENT_CAPACITY: usize = 64;

type PendingKey = (ToolId, PathBuf);

/// 监听循环与手动检测共享的状态
struct WatcherShared {
    tools: Vec<Tool>,
    ledger: Arc<FingerprintLedger>,
    locks: ToolLocks,
    store: Arc<ProfileStore>,
    pending: Mutex<BTreeMap<PendingKey, ExternalConfigChange>>,
    events: broadcast::Sender<ExternalConfigChange>,
}

impl WatcherShared {
    fn pending(&self) -> std::sync::MutexGuard<'_, BTreeMap<PendingKey, ExternalConfigChange>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 检测全部工具，返回本轮新增/更新并已通知的变更（阻塞 I/O）
    ///
    /// `cancel` 已触发时本轮结果被丢弃：不写入待处理集合，也不通知。
    fn detect_all(&self, cancel: Option<&CancellationToken>) -> Vec<ExternalConfigChange> {
        self.tools
            .iter()
            .flat_map(|tool| self.detect_tool(tool, cancel))
            .collect()
    }

    fn detect_tool(
        &self,
        tool: &Tool,
        cancel: Option<&CancellationToken>,
    ) -> Vec<ExternalConfigChange> {
        let Some(_guard) = self.locks.try_lock(tool.id) else {
            debug!(tool_id = %tool.id, "工具正在写入，跳过本轮检测");
            return Vec::new();
        };

        let mut changes = Vec::new();
        let mut adopted = false;

        for path in tool.native_paths() {
            let content = match read_optional(&path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(
                        tool_id = %tool.id,
                        path = %path.display(),
                        error = %err,
                        "读取原生配置失败，等待下一轮"
                    );
                    continue;
                }
            };
            let checksum = content_checksum(content.as_deref());
            let key = (tool.id, path.clone());

            match self.ledger.expected(tool.id, &path) {
                None => {
                    // 引擎从未写过该文件：以当前内容为基线
                    self.ledger.record_path(tool.id, &path, checksum);
                    adopted = true;
                }
                Some(expected) if expected == checksum => {
                    if self.pending().remove(&key).is_some() {
                        debug!(
                            tool_id = %tool.id,
                            path = %path.display(),
                            "文件已恢复为引擎写入的内容"
                        );
                    }
                }
                Some(_) => {
                    let mut pending = self.pending();
                    if pending.get(&key).is_some_and(|c| c.checksum == checksum) {
                        continue;
                    }
                    // 写入与通知在同一临界区内，二者要么都发生要么都不发生
                    if cancel.is_some_and(CancellationToken::is_cancelled) {
                        debug!(
                            tool_id = %tool.id,
                            path = %path.display(),
                            "监听已停止，丢弃本轮检测结果"
                        );
                        continue;
                    }
                    let change = ExternalConfigChange {
                        tool_id: tool.id,
                        path: path.clone(),
                        detected_at: Utc::now(),
                        checksum,
                        content_snapshot: content.and_then(text_snapshot),
                    };
                    pending.insert(key, change.clone());
                    info!(tool_id = %tool.id, path = %path.display(), "检测到外部配置变更");
                    // 每次写入待处理集合恰好通知一次；没有订阅者时发送失败，忽略即可
                    let _ = self.events.send(change.clone());
                    changes.push(change);
                }
            }
        }

        if adopted {
            if let Err(err) = self
                .store
                .set_native_checksums(tool.id, self.ledger.for_tool(tool.id))
            {
                warn!(tool_id = %tool.id, error = %err, "保存基线校验和失败");
            }
        }
        changes
    }
}

fn text_snapshot(bytes: Vec<u8>) -> Option<String> {
    if bytes.len() > MAX_SNAPSHOT_BYTES {
        return None;
    }
    String::from_utf8(bytes).ok()
}

struct WatchTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 外部变更监听器
///
/// 停止监听只结束循环，已记录但未处理的变更保留，直到被确认或导入。
pub struct ChangeWatcher {
    shared: Arc<WatcherShared>,
    settings: watch::Sender<WatchSettings>,
    task: Mutex<Option<WatchTask>>,
    push_active: Arc<AtomicBool>,
}

impl ChangeWatcher {
    pub fn new(
        tools: Vec<Tool>,
        ledger: Arc<FingerprintLedger>,
        locks: ToolLocks,
        store: Arc<ProfileStore>,
        settings: WatchSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (settings, _) = watch::channel(settings);
        Self {
            shared: Arc::new(WatcherShared {
                tools,
                ledger,
                locks,
                store,
                pending: Mutex::new(BTreeMap::new()),
                events,
            }),
            settings,
            task: Mutex::new(None),
            push_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 订阅外部变更事件，drop 接收端即取消订阅
    pub fn subscribe(&self) -> broadcast::Receiver<ExternalConfigChange> {
        self.shared.events.subscribe()
    }

    /// 立即执行一轮检测（阻塞 I/O）
    pub fn detect_now(&self) -> Vec<ExternalConfigChange> {
        self.shared.detect_all(None)
    }

    /// 按检测时间排序的待处理变更
    pub fn pending(&self) -> Vec<ExternalConfigChange> {
        let mut changes: Vec<_> = self.shared.pending().values().cloned().collect();
        changes.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
        changes
    }

    pub fn clear_tool(&self, tool_id: ToolId) -> usize {
        let mut pending = self.shared.pending();
        let before = pending.len();
        pending.retain(|(id, _), _| *id != tool_id);
        before - pending.len()
    }

    pub fn clear_path(&self, tool_id: ToolId, path: &Path) -> bool {
        self.shared
            .pending()
            .remove(&(tool_id, path.to_path_buf()))
            .is_some()
    }

    pub fn settings(&self) -> WatchSettings {
        *self.settings.borrow()
    }

    /// 更新运行参数；间隔变化在下一轮生效，开关变化立即启动/停止循环
    pub async fn apply_settings(&self, settings: WatchSettings) {
        self.settings.send_replace(settings);
        if settings.enabled {
            self.start();
        } else {
            self.stop().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn status(&self) -> WatcherStatus {
        let settings = self.settings();
        let running = self.is_running();
        WatcherStatus {
            enabled: settings.enabled,
            running,
            push_active: running && self.push_active.load(Ordering::Relaxed),
            poll_interval_ms: settings.poll_interval.as_millis() as u64,
            pending: self.shared.pending().len(),
        }
    }

    /// 启动监听循环（已运行时为空操作），需在 tokio 运行时内调用
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            self.settings.subscribe(),
            cancel.clone(),
            Arc::clone(&self.push_active),
        ));
        *task = Some(WatchTask { cancel, handle });
        info!("外部变更监听已启动");
    }

    /// 停止监听循环，进行中的读取允许完成但结果被丢弃
    pub async fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(err) = task.handle.await {
                warn!(error = %err, "监听任务异常退出");
            }
            self.push_active.store(false, Ordering::Relaxed);
            info!("外部变更监听已停止");
        }
    }
}

async fn run_loop(
    shared: Arc<WatcherShared>,
    mut settings_rx: watch::Receiver<WatchSettings>,
    cancel: CancellationToken,
    push_active: Arc<AtomicBool>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let _push = match create_push_watcher(&shared.tools, tx.clone()) {
        Ok(watcher) => {
            push_active.store(true, Ordering::Relaxed);
            Some(watcher)
        }
        Err(err) => {
            warn!(error = %err, "文件系统通知不可用，仅使用轮询");
            push_active.store(false, Ordering::Relaxed);
            None
        }
    };

    let mut period = settings_rx.borrow_and_update().poll_interval;
    let mut ticker = interval_at(Instant::now(), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                detect_in_background(&shared, &cancel).await;
            }
            Some(path) = rx.recv() => {
                // 合并同一时刻的多条通知
                while rx.try_recv().is_ok() {}
                debug!(path = %path.display(), "收到文件系统通知");
                detect_in_background(&shared, &cancel).await;
            }
            changed = settings_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = settings_rx.borrow_and_update().poll_interval;
                if next != period {
                    debug!(interval_ms = next.as_millis() as u64, "轮询间隔已更新");
                    period = next;
                    ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                }
            }
        }
    }
    drop(tx);
}

async fn detect_in_background(shared: &Arc<WatcherShared>, cancel: &CancellationToken) {
    let worker = Arc::clone(shared);
    let token = cancel.clone();
    let result = tokio::task::spawn_blocking(move || worker.detect_all(Some(&token))).await;
    match result {
        Ok(changes) if !changes.is_empty() => {
            debug!(count = changes.len(), "本轮检测完成");
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "检测任务异常"),
    }
}

/// 为所有原生文件的父目录创建 notify 监听
fn create_push_watcher(
    tools: &[Tool],
    tx: mpsc::UnboundedSender<PathBuf>,
) -> Result<RecommendedWatcher> {
    let tracked: BTreeSet<PathBuf> = tools.iter().flat_map(Tool::native_paths).collect();
    let dirs: BTreeSet<PathBuf> = tracked
        .iter()
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .collect();

    let filter = tracked.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else {
            return;
        };
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }
        for path in event.paths {
            if filter.contains(&path) {
                let _ = tx.send(path);
            }
        }
    })?;

    let mut watched = 0;
    for dir in &dirs {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "目录不存在，依赖轮询");
            continue;
        }
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => watched += 1,
            Err(err) => warn!(dir = %dir.display(), error = %err, "注册文件系统通知失败"),
        }
    }
    debug!(count = watched, "文件系统通知注册完成");
    Ok(watcher)
}
