//! 内存存储实现
//!
//! 数据仅在内存中，重启后丢失

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::invitation_code::{InviteCode, Reservation, ReservationState};
use crate::domain::user::ProvisionedUser;

use super::{InviteStore, StoreError, StoreResult};

/// 内存存储
///
/// 每个邀请码的更新都在 DashMap 的条目锁内完成，适合测试和单实例部署。
pub struct MemoryStore {
    invites: DashMap<String, InviteCode>,
    reservations: DashMap<String, ReservationState>,
    users: DashMap<String, ProvisionedUser>,
}

impl MemoryStore {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self {
            invites: DashMap::new(),
            reservations: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// 预留当前状态（测试用）
    pub fn reservation_state(&self, reservation_id: &str) -> Option<ReservationState> {
        self.reservations.get(reservation_id).map(|s| *s)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InviteStore for MemoryStore {
    async fn lookup(&self, code: &str) -> StoreResult<InviteCode> {
        self.invites
            .get(code)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn reserve_and_decrement(&self, code: &str) -> StoreResult<Reservation> {
        let mut invite = self.invites.get_mut(code).ok_or(StoreError::NotFound)?;

        if invite.is_expired() {
            return Err(StoreError::Expired);
        }
        if invite.is_exhausted() {
            return Err(StoreError::Exhausted);
        }
        if !invite.is_unlimited() {
            invite.uses_remaining -= 1;
        }

        let reservation = Reservation::new(code);
        self.reservations
            .insert(reservation.id.clone(), ReservationState::Pending);
        Ok(reservation)
    }

    async fn release(&self, reservation: &Reservation) -> StoreResult<bool> {
        // 只有从 Pending 迁移成功的调用才能归还次数
        let transitioned = match self.reservations.get_mut(&reservation.id) {
            Some(mut state) if *state == ReservationState::Pending => {
                *state = ReservationState::Released;
                true
            }
            _ => false,
        };
        if !transitioned {
            return Ok(false);
        }

        if let Some(mut invite) = self.invites.get_mut(&reservation.code) {
            invite.restore_use();
        }
        Ok(true)
    }

    async fn confirm(&self, reservation: &Reservation, _user_id: &str) -> StoreResult<()> {
        if let Some(mut state) = self.reservations.get_mut(&reservation.id) {
            if *state == ReservationState::Pending {
                *state = ReservationState::Confirmed;
            }
        }
        Ok(())
    }

    async fn save_invite(&self, invite: &InviteCode) -> StoreResult<()> {
        self.invites.insert(invite.code.clone(), invite.clone());
        Ok(())
    }

    async fn save_user(&self, user: &ProvisionedUser) -> StoreResult<()> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, username: &str, email: &str) -> StoreResult<Option<ProvisionedUser>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.conflicts_with(username, email))
            .map(|u| u.clone()))
    }

    async fn load_users(&self) -> StoreResult<Vec<ProvisionedUser>> {
        Ok(self.users.iter().map(|u| u.clone()).collect())
    }
}
