//! 内存 KV 存储
//!
//! 用于嵌入式场景和测试：内容可随时修改，支持注入失败并统计访问次数

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use super::store::{RemoteStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    pending_failures: AtomicUsize,
    pending_listing_failures: AtomicUsize,
    version_fetches: AtomicUsize,
    full_fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let store = Self::new();
        store.replace_all(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        store
    }

    pub fn set(&self, key: &str, value: &str) {
        self.write().insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        self.write().remove(key);
    }

    /// 整体替换存储内容
    pub fn replace_all(&self, values: HashMap<String, String>) {
        *self.write() = values;
    }

    /// 接下来的 n 次访问（任意方法）返回 [`StoreError::Unavailable`]
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// 只让接下来的 n 次 `get_all_values` 失败，`get_value` 不受影响
    pub fn fail_next_listing(&self, n: usize) {
        self.pending_listing_failures.store(n, Ordering::SeqCst);
    }

    /// `get_value` 被调用的次数，包括失败的调用
    pub fn version_fetches(&self) -> usize {
        self.version_fetches.load(Ordering::SeqCst)
    }

    /// `get_all_values` 被调用的次数，包括失败的调用
    pub fn full_fetches(&self) -> usize {
        self.full_fetches.load(Ordering::SeqCst)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        self.values.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn injected_failure(counter: &AtomicUsize) -> Result<(), StoreError> {
        let consumed = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.version_fetches.fetch_add(1, Ordering::SeqCst);
        Self::injected_failure(&self.pending_failures)?;
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn get_all_values(&self) -> Result<HashMap<String, String>, StoreError> {
        self.full_fetches.fetch_add(1, Ordering::SeqCst);
        Self::injected_failure(&self.pending_failures)?;
        Self::injected_failure(&self.pending_listing_failures)?;
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
