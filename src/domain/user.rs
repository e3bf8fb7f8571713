//! Provisioned user record

use serde::{Deserialize, Serialize};

use super::invitation_code::ServerType;

/// 兑换成功后在本地记录的用户
///
/// 只保存外部用户 ID，不保存密码。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub external_user_id: String, // 媒体服务器上的用户 ID
    pub server_type: ServerType,
    pub invite_code: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl ProvisionedUser {
    pub fn new(
        username: String,
        email: String,
        external_user_id: String,
        server_type: ServerType,
        invite_code: String,
        duration_days: Option<u32>,
    ) -> Self {
        let created_at = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            email,
            external_user_id,
            server_type,
            invite_code,
            created_at,
            expires_at: duration_days.map(|days| created_at + i64::from(days) * 24 * 60 * 60),
        }
    }

    /// 用户名或邮箱是否与给定值冲突（忽略大小写）
    pub fn conflicts_with(&self, username: &str, email: &str) -> bool {
        self.username.eq_ignore_ascii_case(username) || self.email.eq_ignore_ascii_case(email)
    }
}
