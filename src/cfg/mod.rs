//! cfg 模块 - 远程配置
//!
//! 从远程 KV 存储加载配置，轮询版本 key，在版本变化时原子替换配置快照并通知订阅者

mod macros;

pub mod consul_store;
pub mod error;
pub mod memory_store;
pub mod options;
pub mod provider;
pub mod serde_duration;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod subscriber;
pub mod watcher;

// 重新导出公共 API
pub use consul_store::{ConsulStore, ConsulStoreConfig};
pub use error::CfgError;
pub use memory_store::MemoryStore;
pub use options::{RemoteSourceOptions, DEFAULT_POLL_INTERVAL, DEFAULT_VERSION_KEY};
pub use provider::RemoteConfigProvider;
pub use snapshot::{detect_change, ConfigSnapshot, VersionCheck};
pub use source::{ConfigProvider, ConfigSource, ConsulSource, ConsulSourceConfig, RemoteSource};
pub use store::{RemoteStore, StoreError};
pub use subscriber::{ReloadEvent, ReloadListener, SubscriptionHandle};
pub use watcher::WatcherState;
