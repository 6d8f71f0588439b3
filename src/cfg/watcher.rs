//! 后台轮询
//!
//! 每个提供者最多一个轮询线程：等待轮询间隔，拉取版本 key，版本变化时全量刷新并通知订阅者

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::error::CfgError;
use super::provider::ProviderState;
use super::serde_duration::format_duration;

const WATCHER_THREAD_NAME: &str = "remote-cfg-watcher";

/// 轮询线程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// 尚未启动
    Idle,
    /// 正在轮询
    Running,
    /// 已停止，不会再次启动
    Stopped,
}

/// 单次轮询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Unchanged,
    Reloaded,
    /// 收到停止信号，正常退出路径
    Cancelled,
}

/// 轮询线程句柄，drop 时发送停止信号并等待线程结束
pub(crate) struct WatchHandle {
    stop_sender: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl WatchHandle {
    fn is_finished(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.send(());
        }

        if let Some(handle) = self.thread_handle.take() {
            // 订阅者回调里释放了最后一个提供者引用时，drop 发生在轮询线程自身
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("reload watcher thread panicked");
            }
        }
    }
}

enum Phase {
    Idle,
    Running(WatchHandle),
    Stopped,
}

pub(crate) struct ReloadWatcher {
    phase: Phase,
}

impl ReloadWatcher {
    pub(crate) fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub(crate) fn state(&self) -> WatcherState {
        match &self.phase {
            Phase::Idle => WatcherState::Idle,
            Phase::Running(handle) if !handle.is_finished() => WatcherState::Running,
            Phase::Running(_) | Phase::Stopped => WatcherState::Stopped,
        }
    }

    /// 启动轮询线程
    ///
    /// 已在运行时返回 `Ok(false)`；停止之后不能再次启动
    pub(crate) fn start(
        &mut self,
        state: Arc<ProviderState>,
        poll_interval: Duration,
    ) -> Result<bool, CfgError> {
        match self.phase {
            Phase::Running(_) => return Ok(false),
            Phase::Stopped => return Err(CfgError::Disposed),
            Phase::Idle => {}
        }

        let (stop_tx, stop_rx) = channel::bounded(1);
        let thread_handle = thread::Builder::new()
            .name(WATCHER_THREAD_NAME.to_string())
            .spawn(move || run(state, poll_interval, stop_rx))?;

        self.phase = Phase::Running(WatchHandle {
            stop_sender: Some(stop_tx),
            thread_handle: Some(thread_handle),
        });
        Ok(true)
    }

    /// 切换到停止状态，返回运行中的线程句柄
    ///
    /// 句柄 drop 时才发送停止信号并 join，调用方可以在释放自己的锁之后再 drop
    pub(crate) fn stop(&mut self) -> Option<WatchHandle> {
        match std::mem::replace(&mut self.phase, Phase::Stopped) {
            Phase::Running(handle) => Some(handle),
            Phase::Idle | Phase::Stopped => None,
        }
    }
}

fn run(state: Arc<ProviderState>, poll_interval: Duration, stop_rx: Receiver<()>) {
    log::debug!(
        "reload watcher started, polling every {}",
        format_duration(poll_interval)
    );

    loop {
        match tick(&state, poll_interval, &stop_rx) {
            Ok(TickOutcome::Cancelled) => break,
            Ok(TickOutcome::Reloaded) => log::info!("remote configuration reloaded"),
            Ok(TickOutcome::Unchanged) => {}
            Err(CfgError::Store(e)) => log::warn!("background refresh failed: {}", e),
            Err(e) => log::error!("background refresh failed: {}", e),
        }
    }

    log::debug!("reload watcher stopped");
}

/// 单次轮询，任何错误都只影响当前这一轮
pub(crate) fn tick(
    state: &ProviderState,
    poll_interval: Duration,
    stop_rx: &Receiver<()>,
) -> Result<TickOutcome, CfgError> {
    match stop_rx.recv_timeout(poll_interval) {
        Err(RecvTimeoutError::Timeout) => {}
        Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(TickOutcome::Cancelled),
    }

    let fetched = state.fetch_version()?;

    // 拉取期间收到停止信号，丢弃结果
    if cancel_requested(stop_rx) {
        return Ok(TickOutcome::Cancelled);
    }

    if state.apply_version(fetched)? {
        Ok(TickOutcome::Reloaded)
    } else {
        Ok(TickOutcome::Unchanged)
    }
}

fn cancel_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}
