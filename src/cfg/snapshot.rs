//! 配置快照与版本比较

use std::collections::HashMap;

/// 某一时刻的完整配置
///
/// 快照创建后不可修改，刷新配置时总是构造新的快照整体替换
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    values: HashMap<String, String>,
    version: Option<String>,
}

impl ConfigSnapshot {
    /// 从全量键值对构造快照，并提取 `version_key` 对应的版本值
    pub fn new(values: HashMap<String, String>, version_key: &str) -> Self {
        let version = values.get(version_key).cloned();
        Self { values, version }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    /// 快照中的版本值，远端没有版本 key 时为 None
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 版本比较结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// 版本未变化，无需刷新
    Unchanged,
    /// 版本变化，需要全量刷新
    Changed {
        from: Option<String>,
        to: Option<String>,
    },
}

impl VersionCheck {
    pub fn is_changed(&self) -> bool {
        matches!(self, VersionCheck::Changed { .. })
    }
}

/// 比较本地记录的版本与远端最新版本
///
/// 精确的字符串比较，不做数值或语义化版本解析。
/// 不存在（None）与任何字符串都不相等，包括空字符串。
pub fn detect_change(recorded: Option<&str>, fetched: Option<&str>) -> VersionCheck {
    if recorded == fetched {
        VersionCheck::Unchanged
    } else {
        VersionCheck::Changed {
            from: recorded.map(str::to_string),
            to: fetched.map(str::to_string),
        }
    }
}
