//! 媒体服务器后端接口与注册表
//!
//! 每种服务器类型对应一个 `MediaBackend` 实现，开通流程只通过
//! `BackendRegistry` 按邀请码的服务器类型选取适配器。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::domain::invitation_code::ServerType;
use crate::domain::provisioning::{FailureReason, NewAccount};

/// 后端错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("user already exists")]
    DuplicateUser,

    #[error("media server rejected credentials")]
    InvalidCredentials,

    #[error("media server unavailable")]
    BackendUnavailable,

    #[error("unexpected backend error: {0}")]
    Unknown(String),
}

impl From<BackendError> for FailureReason {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DuplicateUser => FailureReason::DuplicateUser,
            BackendError::InvalidCredentials => FailureReason::InvalidCredentials,
            BackendError::BackendUnavailable => FailureReason::BackendUnavailable,
            BackendError::Unknown(detail) => FailureReason::Unknown(detail),
        }
    }
}

/// 媒体服务器后端
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// 服务器类型
    fn server_type(&self) -> ServerType;

    /// 创建账号，返回服务器上的用户 ID
    async fn create_account(&self, account: &NewAccount) -> Result<String, BackendError>;

    /// 删除已创建的账号（用于撤销超时后才完成的开通）
    async fn remove_account(&self, user_id: &str) -> Result<(), BackendError>;
}

/// 后端注册表
pub struct BackendRegistry {
    backends: DashMap<ServerType, Arc<dyn MediaBackend>>,
}

impl BackendRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            backends: DashMap::new(),
        }
    }

    /// 注册后端，同一类型只能注册一次
    pub fn register(&self, backend: Arc<dyn MediaBackend>) -> anyhow::Result<()> {
        let server_type = backend.server_type();
        if self.backends.contains_key(&server_type) {
            return Err(anyhow::anyhow!("Backend already registered: {}", server_type));
        }

        self.backends.insert(server_type, backend);
        debug!("Registered media backend: {}", server_type);
        Ok(())
    }

    /// 按服务器类型获取后端
    pub fn get(&self, server_type: ServerType) -> Option<Arc<dyn MediaBackend>> {
        self.backends.get(&server_type).map(|b| b.clone())
    }

    pub fn contains(&self, server_type: ServerType) -> bool {
        self.backends.contains_key(&server_type)
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn server_types(&self) -> Vec<ServerType> {
        self.backends.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
