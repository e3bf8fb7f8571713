//! 账号开通请求与结果

use serde::Serialize;

use super::invitation_code::ServerType;

/// 开通请求
///
/// 仅在一次兑换调用内存活，密码不会被持久化。
#[derive(Clone)]
pub struct ProvisioningRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub invite_code: String,
    /// 表单提交的目标端点
    pub target: ServerType,
}

impl std::fmt::Debug for ProvisioningRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("invite_code", &self.invite_code)
            .field("target", &self.target)
            .finish()
    }
}

/// 交给后端适配器的账号信息
#[derive(Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub libraries: Vec<String>,
}

impl NewAccount {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            libraries: Vec::new(),
        }
    }

    pub fn with_libraries(mut self, libraries: Vec<String>) -> Self {
        self.libraries = libraries;
        self
    }
}

impl std::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("libraries", &self.libraries)
            .finish()
    }
}

/// 失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    InviteInvalid,
    InviteExpired,
    InviteExhausted,
    ServerTypeMismatch {
        invite: ServerType,
        requested: ServerType,
    },
    FormValidation(String),
    DuplicateUser,
    InvalidCredentials,
    BackendUnavailable,
    StoreUnavailable,
    Unknown(String),
}

impl FailureReason {
    /// 展示给用户的错误文案
    pub fn message(&self) -> String {
        match self {
            FailureReason::InviteInvalid => "Invalid invitation code.".to_string(),
            FailureReason::InviteExpired => "This invitation has expired.".to_string(),
            FailureReason::InviteExhausted => {
                "This invitation has already been used.".to_string()
            }
            FailureReason::ServerTypeMismatch { invite, .. } => {
                format!("This invitation can only be used on {}.", invite.display_name())
            }
            FailureReason::FormValidation(msg) => msg.clone(),
            FailureReason::DuplicateUser => "User or e-mail already exists.".to_string(),
            FailureReason::InvalidCredentials => {
                "The media server rejected the provided credentials.".to_string()
            }
            FailureReason::BackendUnavailable => {
                "The media server is unavailable. Please try again later.".to_string()
            }
            FailureReason::StoreUnavailable | FailureReason::Unknown(_) => {
                "An unexpected error occurred during user creation.".to_string()
            }
        }
    }

    /// 需要上报运维日志的失败
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            FailureReason::BackendUnavailable
                | FailureReason::StoreUnavailable
                | FailureReason::Unknown(_)
        )
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Unknown(detail) => write!(f, "unknown: {}", detail),
            FailureReason::ServerTypeMismatch { invite, requested } => {
                write!(f, "server type mismatch: invite={} requested={}", invite, requested)
            }
            other => f.write_str(&other.message()),
        }
    }
}

/// 开通结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProvisioningResult {
    Success {
        user_id: String,
        server_type: ServerType,
    },
    Failure {
        reason: FailureReason,
    },
}

impl ProvisioningResult {
    pub fn failure(reason: FailureReason) -> Self {
        ProvisioningResult::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProvisioningResult::Success { .. })
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            ProvisioningResult::Failure { reason } => Some(reason),
            ProvisioningResult::Success { .. } => None,
        }
    }
}
