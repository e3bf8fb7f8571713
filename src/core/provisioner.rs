//! 账号开通编排
//!
//! 单次兑换的状态机：校验 → 预留 → 开通 → 确认或归还。
//! 预留是乐观的：后端失败时立即 `release`，不会在网络调用期间持有锁。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::backend::{BackendError, BackendRegistry, MediaBackend};
use crate::core::store::{InviteStore, StoreError};
use crate::domain::invitation_code::{InviteCode, Reservation};
use crate::domain::provisioning::{FailureReason, NewAccount, ProvisioningRequest, ProvisioningResult};
use crate::domain::user::ProvisionedUser;

/// 默认的后端调用超时
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(60);

/// 账号开通器
pub struct AccountProvisioner {
    store: Arc<dyn InviteStore>,
    backends: Arc<BackendRegistry>,
    timeout: Duration,
}

impl AccountProvisioner {
    pub fn new(store: Arc<dyn InviteStore>, backends: Arc<BackendRegistry>) -> Self {
        Self {
            store,
            backends,
            timeout: DEFAULT_PROVISION_TIMEOUT,
        }
    }

    /// 设置后端调用的总超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn InviteStore> {
        &self.store
    }

    /// 执行一次兑换
    pub async fn provision(&self, request: ProvisioningRequest) -> ProvisioningResult {
        info!(
            "Redemption attempt: code={} username={} target={}",
            request.invite_code, request.username, request.target
        );

        let result = self.run(&request).await;
        match &result {
            ProvisioningResult::Success { user_id, server_type } => {
                info!(
                    "User {} created on {} server (id: {})",
                    request.username, server_type, user_id
                );
            }
            ProvisioningResult::Failure { reason } if reason.is_operational() => {
                error!(
                    "Redemption of {} for {} failed: {}",
                    request.invite_code, request.username, reason
                );
            }
            ProvisioningResult::Failure { reason } => {
                info!(
                    "Redemption of {} for {} rejected: {}",
                    request.invite_code, request.username, reason
                );
            }
        }
        result
    }

    async fn run(&self, request: &ProvisioningRequest) -> ProvisioningResult {
        // 1. 校验
        let invite = match self.validate(request).await {
            Ok(invite) => invite,
            Err(reason) => return ProvisioningResult::failure(reason),
        };

        let Some(backend) = self.backends.get(invite.server_type) else {
            error!("No media backend configured for {}", invite.server_type);
            return ProvisioningResult::failure(FailureReason::BackendUnavailable);
        };

        // 2. 预留
        let reservation = match self.store.reserve_and_decrement(&invite.code).await {
            Ok(reservation) => reservation,
            Err(err) => return ProvisioningResult::failure(reason_from_store(err)),
        };

        // 3. 开通
        let account = NewAccount::new(&request.username, &request.email, &request.password)
            .with_libraries(invite.libraries.clone());

        // 后端调用放在独立任务中，超时后也会执行完毕，不会半途丢弃
        let mut task = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.create_account(&account).await })
        };

        let waited = tokio::time::timeout(self.timeout, &mut task).await;
        let outcome = match waited {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Err(BackendError::Unknown(format!("backend task failed: {}", e))),
            Err(_) => {
                warn!(
                    "{} backend did not answer within {:?}",
                    invite.server_type, self.timeout
                );
                undo_late_account(task, backend, request.username.clone());
                Err(BackendError::BackendUnavailable)
            }
        };

        match outcome {
            Ok(external_user_id) => {
                self.commit(&reservation, &invite, request, &external_user_id)
                    .await;
                ProvisioningResult::Success {
                    user_id: external_user_id,
                    server_type: invite.server_type,
                }
            }
            Err(err) => {
                self.compensate(&reservation).await;
                ProvisioningResult::failure(err.into())
            }
        }
    }

    /// 校验阶段，不产生任何写入
    async fn validate(&self, request: &ProvisioningRequest) -> Result<InviteCode, FailureReason> {
        let invite = self
            .store
            .lookup(&request.invite_code)
            .await
            .map_err(reason_from_store)?;

        if invite.is_expired() {
            return Err(FailureReason::InviteExpired);
        }

        // 以邀请码上的服务器类型为准
        if invite.server_type != request.target {
            return Err(FailureReason::ServerTypeMismatch {
                invite: invite.server_type,
                requested: request.target,
            });
        }

        match self.store.find_user(&request.username, &request.email).await {
            Ok(Some(_)) => return Err(FailureReason::DuplicateUser),
            Ok(None) => {}
            Err(err) => return Err(reason_from_store(err)),
        }

        Ok(invite)
    }

    /// 确认预留并记录用户；账号已在服务器上存在，这里的失败只记录日志
    async fn commit(
        &self,
        reservation: &Reservation,
        invite: &InviteCode,
        request: &ProvisioningRequest,
        external_user_id: &str,
    ) {
        if let Err(e) = self.store.confirm(reservation, external_user_id).await {
            error!(
                "Failed to confirm reservation {} for invite {}: {}",
                reservation.id, reservation.code, e
            );
        }

        let user = ProvisionedUser::new(
            request.username.clone(),
            request.email.clone(),
            external_user_id.to_string(),
            invite.server_type,
            invite.code.clone(),
            invite.duration_days,
        );
        if let Err(e) = self.store.save_user(&user).await {
            error!("Failed to record provisioned user {}: {}", user.username, e);
        }
    }

    /// 补偿：归还预留的使用次数
    async fn compensate(&self, reservation: &Reservation) {
        match self.store.release(reservation).await {
            Ok(true) => info!(
                "Released reservation {} for invite {}",
                reservation.id, reservation.code
            ),
            Ok(false) => warn!("Reservation {} was already settled", reservation.id),
            Err(e) => error!(
                "Failed to release reservation {} for invite {}: {}",
                reservation.id, reservation.code, e
            ),
        }
    }
}

/// 等待超时的开通任务结束；如果账号最终创建成功则删除它，
/// 因为这次兑换已经按失败处理并归还了次数
fn undo_late_account(
    task: JoinHandle<Result<String, BackendError>>,
    backend: Arc<dyn MediaBackend>,
    username: String,
) {
    tokio::spawn(async move {
        match task.await {
            Ok(Ok(user_id)) => {
                warn!(
                    "Account {} for {} was created after the timeout, removing it",
                    user_id, username
                );
                if let Err(e) = backend.remove_account(&user_id).await {
                    error!(
                        "Failed to remove late {} account {} for {}: {}",
                        backend.server_type(),
                        user_id,
                        username,
                        e
                    );
                }
            }
            // 适配器在失败时已自行回滚
            Ok(Err(e)) => debug!("Timed out provisioning for {} ended with: {}", username, e),
            Err(e) => error!("Provisioning task for {} failed: {}", username, e),
        }
    });
}

fn reason_from_store(err: StoreError) -> FailureReason {
    match err {
        StoreError::NotFound => FailureReason::InviteInvalid,
        StoreError::Expired => FailureReason::InviteExpired,
        StoreError::Exhausted => FailureReason::InviteExhausted,
        StoreError::Database(detail) => {
            error!("Invite store error: {}", detail);
            FailureReason::StoreUnavailable
        }
    }
}
