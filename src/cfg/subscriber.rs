//! 重新加载通知
//!
//! 订阅者在每次由版本变化触发的刷新完成后收到通知

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::snapshot::ConfigSnapshot;

/// 重新加载事件
#[derive(Debug, Clone)]
pub struct ReloadEvent {
    /// 刷新前记录的版本值
    pub previous_version: Option<String>,
    /// 新安装的快照，通知发出时已对所有读者可见
    pub snapshot: Arc<ConfigSnapshot>,
}

pub type ReloadListener = Arc<dyn Fn(&ReloadEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<BTreeMap<u64, ReloadListener>>,
}

/// 订阅者注册表
#[derive(Default, Clone)]
pub(crate) struct SubscriberRegistry {
    inner: Arc<Listeners>,
}

impl SubscriberRegistry {
    pub(crate) fn subscribe(&self, listener: ReloadListener) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// 依次通知所有订阅者，单个订阅者 panic 不影响其他订阅者
    pub(crate) fn notify(&self, event: &ReloadEvent) {
        // 先复制出列表，回调执行期间不持有锁
        let listeners: Vec<ReloadListener> = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::error!("reload listener panicked");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// 订阅句柄，drop 时自动取消订阅
///
/// 需要永久订阅时调用 [`SubscriptionHandle::detach`]
#[must_use = "dropping the handle removes the subscription"]
pub struct SubscriptionHandle {
    id: u64,
    registry: Weak<Listeners>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// 放弃句柄但保留订阅，直到提供者销毁
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(listeners) = self.registry.upgrade() {
            listeners
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}
