//! remote-cfg - 远程配置热更新
//!
//! 从远程 KV 存储（如 Consul）读取应用配置，并在不重启进程的情况下保持配置最新。
//!
//! ## 模块
//!
//! - **cfg**: 配置快照、版本检测、后台轮询与刷新通知
//!
//! ## 工作方式
//!
//! - 🔒 **原子快照**: 读操作无锁，总是看到完整的旧快照或完整的新快照
//! - 🔄 **版本门控**: 每轮只拉取版本 key，版本变化时才全量刷新
//! - 🛡️ **失败隔离**: 单轮轮询失败只记录日志，继续使用最后一次成功加载的配置
//! - ⏹️ **可取消**: 销毁提供者时停止轮询线程并等待其退出

pub mod cfg;

// 重新导出主要的公共 API
pub use cfg::{
    CfgError, ConfigProvider, ConfigSnapshot, ConfigSource, ConsulSource, ConsulSourceConfig,
    ConsulStore, ConsulStoreConfig, MemoryStore, ReloadEvent, RemoteConfigProvider, RemoteSource,
    RemoteSourceOptions, RemoteStore, StoreError, SubscriptionHandle, WatcherState,
};
