//! 远程配置提供者
//!
//! 持有当前配置快照，对外提供同步读取；可选地启动后台轮询，在版本 key 变化时自动刷新

use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::error::CfgError;
use super::options::RemoteSourceOptions;
use super::snapshot::{detect_change, ConfigSnapshot, VersionCheck};
use super::store::RemoteStore;
use super::subscriber::{ReloadEvent, ReloadListener, SubscriberRegistry, SubscriptionHandle};
use super::watcher::{ReloadWatcher, WatcherState};

/// 提供者与轮询线程共享的状态
pub(crate) struct ProviderState {
    store: Box<dyn RemoteStore>,
    version_key: String,
    /// 读路径无锁，整体替换
    snapshot: ArcSwapOption<ConfigSnapshot>,
    /// 本地记录的版本值，所有读写都在锁内
    recorded_version: Mutex<Option<String>>,
    subscribers: SubscriberRegistry,
}

impl ProviderState {
    pub(crate) fn new(store: Box<dyn RemoteStore>, version_key: &str) -> Self {
        Self {
            store,
            version_key: version_key.to_string(),
            snapshot: ArcSwapOption::empty(),
            recorded_version: Mutex::new(None),
            subscribers: SubscriberRegistry::default(),
        }
    }

    /// 全量拉取并安装新快照
    pub(crate) fn load(&self) -> Result<Arc<ConfigSnapshot>, CfgError> {
        let values = self.store.get_all_values().map_err(|e| {
            if self.snapshot.load().is_none() {
                CfgError::InitialLoad(e)
            } else {
                CfgError::Store(e)
            }
        })?;

        let snapshot = Arc::new(ConfigSnapshot::new(values, &self.version_key));
        {
            // 临界区内只做指针替换
            let mut recorded = self
                .recorded_version
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *recorded = snapshot.version().map(str::to_string);
            self.snapshot.store(Some(Arc::clone(&snapshot)));
        }

        log::debug!(
            "loaded {} configuration entries, version {:?}",
            snapshot.len(),
            snapshot.version()
        );
        Ok(snapshot)
    }

    /// 只拉取版本 key
    pub(crate) fn fetch_version(&self) -> Result<Option<String>, CfgError> {
        Ok(self.store.get_value(&self.version_key)?)
    }

    /// 与本地版本比较，变化时刷新并通知订阅者，返回是否刷新
    pub(crate) fn apply_version(&self, fetched: Option<String>) -> Result<bool, CfgError> {
        let recorded = self.recorded_version();

        match detect_change(recorded.as_deref(), fetched.as_deref()) {
            VersionCheck::Unchanged => Ok(false),
            VersionCheck::Changed { from, to } => {
                log::info!(
                    "configuration version changed from {:?} to {:?}, reloading",
                    from,
                    to
                );
                let snapshot = self.load()?;
                // 新快照已安装，订阅者立即读取即可看到新值
                self.subscribers.notify(&ReloadEvent {
                    previous_version: from,
                    snapshot,
                });
                Ok(true)
            }
        }
    }

    pub(crate) fn recorded_version(&self) -> Option<String> {
        self.recorded_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn subscribe(&self, listener: ReloadListener) -> SubscriptionHandle {
        self.subscribers.subscribe(listener)
    }

    pub(crate) fn current(&self) -> Option<Arc<ConfigSnapshot>> {
        self.snapshot.load_full()
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        let guard = self.snapshot.load();
        guard
            .as_deref()
            .and_then(|snapshot| snapshot.get(key).map(str::to_string))
    }
}

/// 远程配置提供者
///
/// # 生命周期
/// - `new` 只做参数校验，不访问远端
/// - `load` 同步全量加载，首次失败返回 [`CfgError::InitialLoad`]，不会安装任何快照
/// - `start_background_refresh` 在 `reload_on_change` 开启时启动轮询线程
/// - `dispose`（或 drop）停止轮询线程并等待其退出，之后读操作继续返回最后的快照
///
/// # 示例
/// ```no_run
/// use remote_cfg::cfg::{ConsulStore, ConsulStoreConfig, RemoteConfigProvider, RemoteSourceOptions};
/// use std::time::Duration;
///
/// let store = ConsulStore::new(ConsulStoreConfig::default()).unwrap();
/// let provider = RemoteConfigProvider::new(
///     store,
///     RemoteSourceOptions::reload_every(Duration::from_secs(30)),
/// ).unwrap();
///
/// provider.load().unwrap();
/// provider.start_background_refresh().unwrap();
///
/// provider.on_reload(|event| {
///     println!("配置已更新到版本 {:?}", event.snapshot.version());
/// }).detach();
///
/// let db = provider.get_value("database/url");
/// ```
pub struct RemoteConfigProvider {
    state: Arc<ProviderState>,
    options: RemoteSourceOptions,
    watcher: Mutex<ReloadWatcher>,
}

impl RemoteConfigProvider {
    pub fn new<S>(store: S, options: RemoteSourceOptions) -> Result<Self, CfgError>
    where
        S: RemoteStore + 'static,
    {
        let options = options.checked()?;
        Ok(Self {
            state: Arc::new(ProviderState::new(Box::new(store), &options.version_key)),
            options,
            watcher: Mutex::new(ReloadWatcher::new()),
        })
    }

    /// 同步全量加载并原子替换当前快照
    ///
    /// 可重复调用；显式调用不会触发 reload 通知
    pub fn load(&self) -> Result<Arc<ConfigSnapshot>, CfgError> {
        self.state.load()
    }

    /// 读取当前快照中的值，不访问网络
    ///
    /// 尚未成功加载时返回 None
    pub fn get_value(&self, key: &str) -> Option<String> {
        self.state.get(key)
    }

    pub fn get_all_values(&self) -> HashMap<String, String> {
        self.state
            .current()
            .map(|snapshot| snapshot.values().clone())
            .unwrap_or_default()
    }

    /// 当前快照，尚未加载时返回 [`CfgError::NotLoaded`]
    pub fn snapshot(&self) -> Result<Arc<ConfigSnapshot>, CfgError> {
        self.state.current().ok_or(CfgError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.state.current().is_some()
    }

    /// 本地记录的版本值
    pub fn version(&self) -> Option<String> {
        self.state.recorded_version()
    }

    pub fn options(&self) -> &RemoteSourceOptions {
        &self.options
    }

    /// 启动后台轮询
    ///
    /// 未开启 `reload_on_change` 或已在运行时直接返回；`dispose` 之后返回 [`CfgError::Disposed`]
    pub fn start_background_refresh(&self) -> Result<(), CfgError> {
        if !self.options.reload_on_change {
            log::debug!("reload_on_change disabled, background refresh not started");
            return Ok(());
        }

        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.start(Arc::clone(&self.state), self.options.poll_interval)? {
            log::info!(
                "background refresh started, watching key {:?}",
                self.options.version_key
            );
        }
        Ok(())
    }

    /// 立即执行一次版本检查，版本变化时刷新并通知订阅者
    ///
    /// 返回是否发生了刷新
    pub fn check_for_changes(&self) -> Result<bool, CfgError> {
        let fetched = self.state.fetch_version()?;
        self.state.apply_version(fetched)
    }

    /// 订阅 reload 通知
    ///
    /// 回调在轮询线程中执行；回调里如需访问提供者，请持有 `Weak` 引用，避免循环引用
    pub fn on_reload<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&ReloadEvent) + Send + Sync + 'static,
    {
        self.state.subscribe(Arc::new(listener))
    }

    pub fn watcher_state(&self) -> WatcherState {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    /// 停止后台轮询并等待线程退出，可重复调用
    pub fn dispose(&self) {
        let handle = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
        // 在锁外 join，订阅者回调里查询 watcher_state 不会死锁
        if let Some(handle) = handle {
            log::info!("stopping background refresh");
            drop(handle);
        }
    }
}

impl Drop for RemoteConfigProvider {
    fn drop(&mut self) {
        self.dispose();
    }
}
