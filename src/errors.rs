//! 标准化错误处理
//!
//! 定义启动和装配阶段使用的错误类型；兑换流程本身的失败见 `FailureReason`

use thiserror::Error;

use crate::core::store::StoreError;

/// 项目主要错误类型
#[derive(Error, Debug)]
pub enum WizarrError {
    /// 存储相关错误
    #[error("Storage error: {0}")]
    StorageError(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 网络请求错误
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 媒体服务器后端错误
    #[error("Backend error: {0}")]
    BackendError(String),

    /// 未知错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for WizarrError {
    fn from(err: anyhow::Error) -> Self {
        WizarrError::Unknown(err.to_string())
    }
}

impl From<std::io::Error> for WizarrError {
    fn from(err: std::io::Error) -> Self {
        WizarrError::StorageError(err.to_string())
    }
}

impl From<StoreError> for WizarrError {
    fn from(err: StoreError) -> Self {
        WizarrError::StorageError(err.to_string())
    }
}

/// 项目结果类型别名
pub type Result<T> = std::result::Result<T, WizarrError>;
