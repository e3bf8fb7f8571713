//! 测试 Fixtures
//!
//! 提供测试数据、假后端和模拟的媒体服务器

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use wizarr::core::backend::{BackendError, MediaBackend};
use wizarr::domain::{InviteCode, InviteUsage, NewAccount, ProvisioningRequest, ServerType};

// ==================== 测试数据 ====================

/// 未过期的有限次数邀请码
pub fn limited_invite(code: &str, server_type: ServerType, uses: u32) -> InviteCode {
    InviteCode::with_code(code, server_type, InviteUsage::Limited(uses))
        .expires_at(chrono::Utc::now().timestamp() + 3600)
}

/// 已过期的邀请码
pub fn expired_invite(code: &str, server_type: ServerType) -> InviteCode {
    InviteCode::with_code(code, server_type, InviteUsage::Limited(1))
        .expires_at(chrono::Utc::now().timestamp() - 3600)
}

pub fn request(username: &str, code: &str, target: ServerType) -> ProvisioningRequest {
    ProvisioningRequest {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password: "correct-horse".to_string(),
        invite_code: code.to_string(),
        target,
    }
}

// ==================== 假后端 ====================

/// 进程内的假媒体服务器后端，记录调用次数
pub struct FakeBackend {
    server_type: ServerType,
    error: Option<BackendError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    accounts: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn succeeding(server_type: ServerType) -> Arc<Self> {
        Arc::new(Self::build(server_type, None, None))
    }

    pub fn failing(server_type: ServerType, error: BackendError) -> Arc<Self> {
        Arc::new(Self::build(server_type, Some(error), None))
    }

    pub fn slow(server_type: ServerType, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(server_type, None, Some(delay)))
    }

    fn build(server_type: ServerType, error: Option<BackendError>, delay: Option<Duration>) -> Self {
        Self {
            server_type,
            error,
            delay,
            calls: AtomicUsize::new(0),
            accounts: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn accounts(&self) -> Vec<String> {
        self.accounts.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn server_type(&self) -> ServerType {
        self.server_type
    }

    async fn create_account(&self, account: &NewAccount) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        self.accounts.lock().unwrap().push(account.username.clone());
        Ok(format!("{}-{}", self.server_type, account.username))
    }

    async fn remove_account(&self, user_id: &str) -> Result<(), BackendError> {
        self.removed.lock().unwrap().push(user_id.to_string());
        Ok(())
    }
}

// ==================== 模拟媒体服务器 ====================

/// 模拟服务器收到的请求
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: &'static str,
    pub path: String,
    pub body: Value,
}

pub struct FakeMediaServer {
    pub auth_header: &'static str,
    pub auth_value: String,
    pub fail_policy: bool,
    pub lookup_delay: Option<Duration>,
    pub requests: Mutex<Vec<Recorded>>,
}

impl FakeMediaServer {
    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn find(&self, method: &str, path: &str) -> Option<Recorded> {
        self.recorded()
            .into_iter()
            .find(|r| r.method == method && r.path == path)
    }

    fn record(&self, method: &'static str, path: String, body: Value) {
        self.requests.lock().unwrap().push(Recorded { method, path, body });
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(self.auth_header)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == self.auth_value)
            .unwrap_or(false)
    }
}

type Shared = Arc<FakeMediaServer>;

async fn create_user(State(s): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if !s.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "Access token is invalid or expired.").into_response();
    }
    s.record("POST", "/Users/New".to_string(), body.clone());

    let name = body["Name"].as_str().unwrap_or_default();
    if name == "taken" {
        return (
            StatusCode::BAD_REQUEST,
            format!("A user with the name '{}' already exists.", name),
        )
            .into_response();
    }
    Json(json!({ "Id": format!("uid-{}", name), "Name": name })).into_response()
}

async fn set_password(
    State(s): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !s.authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    s.record("POST", format!("/Users/{}/Password", id), body);
    StatusCode::NO_CONTENT
}

async fn media_folders(State(s): State<Shared>, headers: HeaderMap) -> impl IntoResponse {
    if !s.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    s.record("GET", "/Library/MediaFolders".to_string(), Value::Null);
    Json(json!({
        "Items": [
            { "Id": "f1", "Name": "Movies" },
            { "Id": "f2", "Name": "Shows" }
        ]
    }))
    .into_response()
}

async fn get_user(State(s): State<Shared>, Path(id): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    if !s.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    s.record("GET", format!("/Users/{}", id), Value::Null);
    if let Some(delay) = s.lookup_delay {
        tokio::time::sleep(delay).await;
    }
    Json(json!({
        "Id": id,
        "Policy": { "IsAdministrator": false, "EnableAllFolders": true }
    }))
    .into_response()
}

async fn delete_user(State(s): State<Shared>, Path(id): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    if !s.authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    s.record("DELETE", format!("/Users/{}", id), Value::Null);
    StatusCode::NO_CONTENT
}

async fn set_policy(
    State(s): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !s.authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    s.record("POST", format!("/Users/{}/Policy", id), body);
    if s.fail_policy {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::NO_CONTENT
    }
}

/// 启动一个模拟的 Emby/Jellyfin 服务器，返回基础 URL
pub async fn spawn_media_server(
    auth_header: &'static str,
    auth_value: &str,
    fail_policy: bool,
) -> (String, Arc<FakeMediaServer>) {
    spawn_with(FakeMediaServer {
        auth_header,
        auth_value: auth_value.to_string(),
        fail_policy,
        lookup_delay: None,
        requests: Mutex::new(Vec::new()),
    })
    .await
}

/// 启动一个 `GET /Users/{id}` 响应缓慢的模拟服务器
pub async fn spawn_slow_media_server(
    auth_header: &'static str,
    auth_value: &str,
    lookup_delay: Duration,
) -> (String, Arc<FakeMediaServer>) {
    spawn_with(FakeMediaServer {
        auth_header,
        auth_value: auth_value.to_string(),
        fail_policy: false,
        lookup_delay: Some(lookup_delay),
        requests: Mutex::new(Vec::new()),
    })
    .await
}

async fn spawn_with(server: FakeMediaServer) -> (String, Arc<FakeMediaServer>) {
    let state = Arc::new(server);

    let app = Router::new()
        .route("/Users/New", post(create_user))
        .route("/Users/{id}", get(get_user).delete(delete_user))
        .route("/Users/{id}/Password", post(set_password))
        .route("/Users/{id}/Policy", post(set_policy))
        .route("/Library/MediaFolders", get(media_folders))
        .with_state(state.clone());

    let addr = serve(app).await;
    (format!("http://{}", addr), state)
}

/// 在随机端口上启动 Router
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // 等待服务器启动
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}
