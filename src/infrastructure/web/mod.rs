//! Web 服务器模块
//!
//! 提供邀请兑换的 HTTP API

use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::application::redemption::{JoinForm, RedemptionOutcome, RedemptionService};
use crate::core::store::{InviteStore, StoreError};
use crate::domain::invitation_code::ServerType;
use crate::domain::provisioning::FailureReason;

// ==================== 错误响应 ====================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ==================== 状态 ====================

#[derive(Clone)]
pub struct AppState {
    pub redemption: Arc<RedemptionService>,
    pub store: Arc<dyn InviteStore>,
}

// ==================== API 响应类型 ====================

#[derive(Serialize)]
pub struct InviteStatusResponse {
    pub code: String,
    pub server_type: ServerType,
    pub redeemable: bool,
}

#[derive(Serialize)]
pub struct JoinSuccessResponse {
    pub success: bool,
    pub user_id: String,
    pub server_type: ServerType,
}

/// 表单重新渲染所需的数据：唯一的错误信息和已填写的字段
#[derive(Serialize)]
pub struct JoinFailureResponse {
    pub success: bool,
    pub error: String,
    pub username: String,
    pub email: String,
}

fn status_for(reason: &FailureReason) -> StatusCode {
    match reason {
        FailureReason::FormValidation(_) | FailureReason::ServerTypeMismatch { .. } => {
            StatusCode::BAD_REQUEST
        }
        FailureReason::InviteInvalid => StatusCode::NOT_FOUND,
        FailureReason::InviteExpired => StatusCode::GONE,
        FailureReason::InviteExhausted | FailureReason::DuplicateUser => StatusCode::CONFLICT,
        FailureReason::InvalidCredentials => StatusCode::BAD_GATEWAY,
        FailureReason::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureReason::StoreUnavailable | FailureReason::Unknown(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ==================== 处理器 ====================

/// 健康检查
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 查询邀请码状态（不预留）
async fn invite_status(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    match state.store.lookup(code.trim()).await {
        Ok(invite) => Json(InviteStatusResponse {
            redeemable: invite.is_redeemable(),
            code: invite.code,
            server_type: invite.server_type,
        })
        .into_response(),
        Err(StoreError::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: FailureReason::InviteInvalid.message(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Database error during invite lookup: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Database error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// 提交加入表单
async fn join(
    State(state): State<Arc<AppState>>,
    Path(server_type): Path<String>,
    form: Result<Form<JoinForm>, FormRejection>,
) -> impl IntoResponse {
    let Ok(target) = server_type.parse::<ServerType>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Unknown server type: {}", server_type),
            }),
        )
            .into_response();
    };

    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            warn!("Rejected join submission on {}: {}", target, rejection);
            return (
                StatusCode::BAD_REQUEST,
                Json(JoinFailureResponse {
                    success: false,
                    error: "Invalid form submission.".to_string(),
                    username: String::new(),
                    email: String::new(),
                }),
            )
                .into_response();
        }
    };

    info!("Join attempt on {} endpoint: {}", target, form.username.trim());

    match state.redemption.redeem(form, target).await {
        RedemptionOutcome::Joined { user_id, server_type } => (
            StatusCode::CREATED,
            Json(JoinSuccessResponse {
                success: true,
                user_id,
                server_type,
            }),
        )
            .into_response(),
        RedemptionOutcome::Rerender {
            error,
            reason,
            username,
            email,
        } => (
            status_for(&reason),
            Json(JoinFailureResponse {
                success: false,
                error,
                username,
                email,
            }),
        )
            .into_response(),
    }
}

// ==================== 路由 ====================

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/invites/{code}", get(invite_status))
        .route("/api/join/{server_type}", post(join))
        .layer(cors)
        .with_state(state)
}

// ==================== 服务器启动 ====================

pub async fn start_web_server(bind_addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Web server started on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
