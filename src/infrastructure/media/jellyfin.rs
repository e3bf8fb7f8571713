//! Jellyfin 适配器

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

use super::{CreatedUser, MediaServerClient};
use crate::core::backend::{BackendError, MediaBackend};
use crate::domain::invitation_code::ServerType;
use crate::domain::provisioning::NewAccount;

/// Jellyfin 后端
#[derive(Debug, Clone)]
pub struct JellyfinBackend {
    client: MediaServerClient,
}

impl JellyfinBackend {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = MediaServerClient::new(
            base_url,
            "Authorization",
            format!("MediaBrowser Token=\"{}\"", api_key),
            timeout,
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaBackend for JellyfinBackend {
    fn server_type(&self) -> ServerType {
        ServerType::Jellyfin
    }

    async fn create_account(&self, account: &NewAccount) -> Result<String, BackendError> {
        info!("Creating Jellyfin user: {}", account.username);
        // Jellyfin 在创建时直接接受密码
        let created: CreatedUser = self
            .client
            .post_json(
                "/Users/New",
                &json!({ "Name": account.username, "Password": account.password }),
            )
            .await?;

        if let Err(e) = self
            .client
            .apply_library_policy(&created.id, &account.libraries)
            .await
        {
            error!("Jellyfin policy for {} failed: {}", account.username, e);
            self.client.rollback_user(&created.id).await;
            return Err(e);
        }

        Ok(created.id)
    }

    async fn remove_account(&self, user_id: &str) -> Result<(), BackendError> {
        self.client.delete(&format!("/Users/{}", user_id)).await
    }
}
