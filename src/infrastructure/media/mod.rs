//! 媒体服务器适配器
//!
//! Emby 与 Jellyfin 共享同一套 REST 结构（`/Users`、`/Library`），
//! 区别在于认证头和创建用户时如何设置密码。

pub mod emby;
pub mod jellyfin;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::core::backend::BackendError;

pub use emby::EmbyBackend;
pub use jellyfin::JellyfinBackend;

/// 开通一个账号最多发出的顺序请求数（Emby：创建、密码、媒体库、读取策略、写入策略）
pub const MAX_REQUESTS_PER_ACCOUNT: u64 = 5;

/// 媒体服务器 HTTP 客户端
#[derive(Debug, Clone)]
pub struct MediaServerClient {
    base_url: String,
    auth_header: &'static str,
    auth_value: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedUser {
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct MediaFolders {
    #[serde(rename = "Items", default)]
    items: Vec<MediaFolder>,
}

#[derive(Debug, Deserialize)]
struct MediaFolder {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

impl MediaServerClient {
    pub fn new(
        base_url: &str,
        auth_header: &'static str,
        auth_value: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let parsed = url::Url::parse(base_url)
            .with_context(|| format!("invalid media server url: {}", base_url))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            auth_header,
            auth_value,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<&Value>) -> Result<Response, BackendError> {
        let mut req = self
            .http
            .request(method.clone(), self.endpoint(path))
            .header(self.auth_header, &self.auth_value);
        if let Some(body) = body {
            req = req.json(body);
        }

        let res = req.send().await.map_err(map_transport_error)?;
        debug!("{} {}{} -> {}", method, self.base_url, path, res.status());
        check_status(res).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let res = self.send(reqwest::Method::GET, path, None).await?;
        read_json(path, res).await
    }

    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, BackendError> {
        let res = self.send(reqwest::Method::POST, path, Some(body)).await?;
        read_json(path, res).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<(), BackendError> {
        self.send(reqwest::Method::POST, path, Some(body)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), BackendError> {
        self.send(reqwest::Method::DELETE, path, None).await?;
        Ok(())
    }

    /// 列出媒体库（ID → 名称）
    pub async fn libraries(&self) -> Result<HashMap<String, String>, BackendError> {
        let folders: MediaFolders = self.get_json("/Library/MediaFolders").await?;
        Ok(folders.items.into_iter().map(|f| (f.id, f.name)).collect())
    }

    /// 为新用户设置媒体库访问范围和播放权限
    pub async fn apply_library_policy(&self, user_id: &str, libraries: &[String]) -> Result<(), BackendError> {
        let folder_ids = if libraries.is_empty() {
            Vec::new()
        } else {
            resolve_folder_ids(libraries, &self.libraries().await?)
        };

        let user: Value = self.get_json(&format!("/Users/{}", user_id)).await?;
        let mut policy = user.get("Policy").cloned().unwrap_or_else(|| json!({}));
        merge_policy(&mut policy, &folder_ids);

        self.post(&format!("/Users/{}/Policy", user_id), &policy).await
    }

    /// 删除部分创建的用户（尽力而为）
    pub async fn rollback_user(&self, user_id: &str) {
        match self.delete(&format!("/Users/{}", user_id)).await {
            Ok(()) => info!("Rolled back media server user {}", user_id),
            Err(e) => warn!("Failed to roll back media server user {}: {}", user_id, e),
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &str, res: Response) -> Result<T, BackendError> {
    let body = res
        .text()
        .await
        .map_err(|e| BackendError::Unknown(format!("failed to read {}: {}", path, e)))?;
    decode_body(path, &body)
}

/// 解析成功响应的正文，失败时在日志和错误中保留原始正文
pub(crate) fn decode_body<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, BackendError> {
    serde_json::from_str(body).map_err(|e| {
        error!("Undecodable response from {}: {} (body: {})", path, e, body);
        BackendError::Unknown(format!("failed to decode {}: {} (body: {})", path, e, body))
    })
}

fn map_transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() || err.is_connect() {
        warn!("Media server unreachable: {}", err);
        BackendError::BackendUnavailable
    } else {
        BackendError::Unknown(err.to_string())
    }
}

async fn check_status(res: Response) -> Result<Response, BackendError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    Err(classify_failure(status, &body))
}

/// 把失败的 HTTP 响应映射为后端错误
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> BackendError {
    match status.as_u16() {
        400 | 409 if body.to_lowercase().contains("already exists") => BackendError::DuplicateUser,
        401 | 403 => BackendError::InvalidCredentials,
        500..=599 => BackendError::BackendUnavailable,
        _ => BackendError::Unknown(format!("{}: {}", status, body.trim())),
    }
}

/// 把媒体库 ID 或名称解析为 ID，忽略无法匹配的项
pub(crate) fn resolve_folder_ids(wanted: &[String], folders: &HashMap<String, String>) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for name in wanted {
        let found = if folders.contains_key(name) {
            Some(name.clone())
        } else {
            folders
                .iter()
                .find(|(_, folder_name)| *folder_name == name)
                .map(|(id, _)| id.clone())
        };

        match found {
            Some(id) if !ids.contains(&id) => ids.push(id),
            Some(_) => {}
            None => warn!("Could not find library matching: {}", name),
        }
    }
    ids
}

/// 在现有策略上叠加媒体库范围与播放权限
pub(crate) fn merge_policy(policy: &mut Value, folder_ids: &[String]) {
    if !policy.is_object() {
        *policy = json!({});
    }
    let Some(obj) = policy.as_object_mut() else {
        return;
    };

    obj.insert("EnableAllFolders".to_string(), json!(folder_ids.is_empty()));
    obj.insert("EnabledFolders".to_string(), json!(folder_ids));
    for key in [
        "EnableMediaPlayback",
        "EnableAudioPlaybackTranscoding",
        "EnableVideoPlaybackTranscoding",
        "EnablePlaybackRemuxing",
        "EnableContentDownloading",
        "EnableRemoteAccess",
    ] {
        obj.insert(key.to_string(), json!(true));
    }
}
