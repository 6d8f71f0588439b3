//! 配置源选项

use garde::Validate;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::time::Duration;

use super::error::CfgError;
use super::serde_duration::{serde_as, HumanDur};

/// 默认轮询间隔：30 分钟
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// 默认版本 key
pub const DEFAULT_VERSION_KEY: &str = "Version";

/// 远程配置源选项
///
/// ```
/// use remote_cfg::cfg::RemoteSourceOptions;
/// use std::time::Duration;
///
/// let options: RemoteSourceOptions = serde_json::from_str(
///     r#"{"reload_on_change": true, "poll_interval": "30s"}"#,
/// ).unwrap();
/// assert_eq!(options.poll_interval, Duration::from_secs(30));
/// assert_eq!(options.version_key, "Version");
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Validate)]
#[serde(default)]
pub struct RemoteSourceOptions {
    /// 版本 key 变化时是否自动重新加载，默认关闭
    #[garde(skip)]
    pub reload_on_change: bool,

    /// 轮询版本 key 的间隔
    #[default(DEFAULT_POLL_INTERVAL)]
    #[serde_as(as = "HumanDur")]
    #[garde(custom(non_zero_interval))]
    pub poll_interval: Duration,

    /// 作为变更标记的 key
    #[default(DEFAULT_VERSION_KEY.to_string())]
    #[garde(length(min = 1))]
    pub version_key: String,
}

fn non_zero_interval(value: &Duration, _ctx: &()) -> garde::Result {
    if value.is_zero() {
        return Err(garde::Error::new("poll_interval must be greater than 0"));
    }
    Ok(())
}

impl RemoteSourceOptions {
    /// 开启自动刷新并指定轮询间隔
    pub fn reload_every(poll_interval: Duration) -> Self {
        Self {
            reload_on_change: true,
            poll_interval,
            ..Self::default()
        }
    }

    pub fn with_version_key(mut self, version_key: impl Into<String>) -> Self {
        self.version_key = version_key.into();
        self
    }

    pub(crate) fn checked(self) -> Result<Self, CfgError> {
        self.validate().map_err(CfgError::invalid_options)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = RemoteSourceOptions::default();
        assert!(!options.reload_on_change);
        assert_eq!(options.poll_interval, Duration::from_secs(1800));
        assert_eq!(options.version_key, "Version");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_deserialize_partial() {
        let options: RemoteSourceOptions =
            serde_json::from_str(r#"{"version_key": "Revision"}"#).unwrap();
        assert!(!options.reload_on_change);
        assert_eq!(options.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(options.version_key, "Revision");
    }

    #[test]
    fn test_options_serialize_human_duration() {
        let options = RemoteSourceOptions::reload_every(Duration::from_secs(30));
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["poll_interval"], "30s");
        assert_eq!(json["reload_on_change"], true);
    }

    #[test]
    fn test_options_validation() {
        let zero = RemoteSourceOptions::reload_every(Duration::ZERO);
        assert!(matches!(zero.checked(), Err(CfgError::InvalidOptions(_))));

        let empty_key = RemoteSourceOptions::default().with_version_key("");
        let err = empty_key.checked().unwrap_err();
        assert!(err.to_string().contains("version_key"));
    }
}
