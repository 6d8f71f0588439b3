//! 远程 KV 存储抽象
//!
//! 配置提供者只依赖此 trait，具体实现可以是 Consul、内存存储或其他配置中心

use std::collections::HashMap;
use thiserror::Error;

/// 远程存储错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 存储不可达（连接失败、返回错误状态等）
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// 请求超时
    #[error("store timeout: {0}")]
    Timeout(String),

    /// 响应无法解析
    #[error("invalid store response: {0}")]
    InvalidResponse(String),
}

/// 远程 KV 存储
///
/// 两个方法都是同步阻塞调用，超时策略由实现自行决定
pub trait RemoteStore: Send + Sync {
    /// 读取单个 key，key 不存在时返回 `Ok(None)`
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 读取该配置源下的全部键值对
    fn get_all_values(&self) -> Result<HashMap<String, String>, StoreError>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<S> {
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get_value(key)
    }

    fn get_all_values(&self) -> Result<HashMap<String, String>, StoreError> {
        (**self).get_all_values()
    }
}

impl<S: RemoteStore + ?Sized> RemoteStore for Box<S> {
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get_value(key)
    }

    fn get_all_values(&self) -> Result<HashMap<String, String>, StoreError> {
        (**self).get_all_values()
    }
}
