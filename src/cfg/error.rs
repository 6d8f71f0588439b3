use thiserror::Error;

use super::store::StoreError;

/// 配置提供者相关错误
#[derive(Error, Debug)]
pub enum CfgError {
    /// 首次加载失败，此时没有任何快照被安装
    #[error("initial load failed: {0}")]
    InitialLoad(#[source] StoreError),

    /// 已有快照之后的加载或版本检查失败，旧快照继续生效
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration not loaded")]
    NotLoaded,

    #[error("provider disposed")]
    Disposed,

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("failed to start reload watcher: {0}")]
    Spawn(#[from] std::io::Error),
}

impl CfgError {
    pub(crate) fn invalid_options(report: garde::Report) -> Self {
        CfgError::InvalidOptions(report.to_string())
    }
}
