//! 配置源抽象
//!
//! 宿主配置框架通过 `ConfigSource` 构建提供者，通过 `ConfigProvider` 读取配置并监听刷新

use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::consul_store::{ConsulStore, ConsulStoreConfig};
use super::error::CfgError;
use super::options::RemoteSourceOptions;
use super::provider::RemoteConfigProvider;
use super::store::RemoteStore;
use super::subscriber::{ReloadEvent, SubscriptionHandle};
use crate::impl_try_from;

/// 宿主框架看到的配置提供者
pub trait ConfigProvider: Send + Sync {
    /// 同步读取，不访问网络
    fn get(&self, key: &str) -> Option<String>;

    /// 当前全部配置
    fn get_all(&self) -> HashMap<String, String>;

    /// 配置刷新后的回调，宿主可在其中重新合并配置
    fn on_reload(&self, listener: Box<dyn Fn(&ReloadEvent) + Send + Sync>) -> SubscriptionHandle;
}

/// 配置源：构建一个已完成首次加载的提供者
pub trait ConfigSource {
    type Provider: ConfigProvider;

    /// 首次加载失败直接返回错误；开启 `reload_on_change` 时同时启动后台轮询
    fn build(&self) -> Result<Self::Provider, CfgError>;
}

impl ConfigProvider for RemoteConfigProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.get_value(key)
    }

    fn get_all(&self) -> HashMap<String, String> {
        self.get_all_values()
    }

    fn on_reload(&self, listener: Box<dyn Fn(&ReloadEvent) + Send + Sync>) -> SubscriptionHandle {
        RemoteConfigProvider::on_reload(self, listener)
    }
}

/// 基于任意 [`RemoteStore`] 的配置源
pub struct RemoteSource {
    store: Arc<dyn RemoteStore>,
    options: RemoteSourceOptions,
}

impl RemoteSource {
    pub fn new(store: Arc<dyn RemoteStore>, options: RemoteSourceOptions) -> Self {
        Self { store, options }
    }
}

impl ConfigSource for RemoteSource {
    type Provider = RemoteConfigProvider;

    fn build(&self) -> Result<RemoteConfigProvider, CfgError> {
        let provider = RemoteConfigProvider::new(Arc::clone(&self.store), self.options.clone())?;
        provider.load()?;
        provider.start_background_refresh()?;
        Ok(provider)
    }
}

/// Consul 配置源配置
///
/// ```
/// use remote_cfg::cfg::ConsulSourceConfig;
/// use std::time::Duration;
///
/// let config: ConsulSourceConfig = serde_json::from_str(r#"{
///     "store": {"address": "http://consul:8500", "prefix": "my-app/"},
///     "options": {"reload_on_change": true, "poll_interval": "30s"}
/// }"#).unwrap();
///
/// assert_eq!(config.options.poll_interval, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsulSourceConfig {
    #[garde(dive)]
    pub store: ConsulStoreConfig,

    #[garde(dive)]
    pub options: RemoteSourceOptions,
}

/// Consul 配置源
///
/// # 示例
/// ```no_run
/// use remote_cfg::cfg::{ConfigSource, ConsulSource, RemoteSourceOptions};
/// use std::time::Duration;
///
/// let source = ConsulSource::with_address(
///     "http://consul:8500",
///     RemoteSourceOptions::reload_every(Duration::from_secs(30)),
/// ).unwrap();
///
/// let provider = source.build().unwrap();
/// println!("{:?}", provider.get_value("Logging:Level"));
/// ```
pub struct ConsulSource {
    inner: RemoteSource,
}

impl ConsulSource {
    pub fn new(config: ConsulSourceConfig) -> Result<Self, CfgError> {
        config.validate().map_err(CfgError::invalid_options)?;
        let store = ConsulStore::new(config.store)?;
        Ok(Self {
            inner: RemoteSource::new(Arc::new(store), config.options),
        })
    }

    /// 只指定地址，其余存储参数使用默认值
    pub fn with_address(
        address: impl Into<String>,
        options: RemoteSourceOptions,
    ) -> Result<Self, CfgError> {
        Self::new(ConsulSourceConfig {
            store: ConsulStoreConfig {
                address: address.into(),
                ..Default::default()
            },
            options,
        })
    }
}

impl_try_from!(ConsulSourceConfig => ConsulSource, CfgError);

impl ConfigSource for ConsulSource {
    type Provider = RemoteConfigProvider;

    fn build(&self) -> Result<RemoteConfigProvider, CfgError> {
        self.inner.build()
    }
}
