//! Emby 适配器

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

use super::{CreatedUser, MediaServerClient};
use crate::core::backend::{BackendError, MediaBackend};
use crate::domain::invitation_code::ServerType;
use crate::domain::provisioning::NewAccount;

/// Emby 后端
///
/// 先创建无密码用户，再单独设置密码，最后应用媒体库策略。
#[derive(Debug, Clone)]
pub struct EmbyBackend {
    client: MediaServerClient,
}

impl EmbyBackend {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = MediaServerClient::new(base_url, "X-Emby-Token", api_key.to_string(), timeout)?;
        Ok(Self { client })
    }

    async fn finish_account(&self, user_id: &str, account: &NewAccount) -> Result<(), BackendError> {
        self.client
            .post(
                &format!("/Users/{}/Password", user_id),
                &json!({
                    "NewPw": account.password,
                    "CurrentPw": "",
                    "ResetPassword": false,
                }),
            )
            .await?;

        self.client
            .apply_library_policy(user_id, &account.libraries)
            .await
    }
}

#[async_trait]
impl MediaBackend for EmbyBackend {
    fn server_type(&self) -> ServerType {
        ServerType::Emby
    }

    async fn create_account(&self, account: &NewAccount) -> Result<String, BackendError> {
        info!("Creating Emby user: {}", account.username);
        let created: CreatedUser = self
            .client
            .post_json("/Users/New", &json!({ "Name": account.username }))
            .await?;

        if let Err(e) = self.finish_account(&created.id, account).await {
            error!("Emby setup for {} failed: {}", account.username, e);
            self.client.rollback_user(&created.id).await;
            return Err(e);
        }

        Ok(created.id)
    }

    async fn remove_account(&self, user_id: &str) -> Result<(), BackendError> {
        self.client.delete(&format!("/Users/{}", user_id)).await
    }
}
