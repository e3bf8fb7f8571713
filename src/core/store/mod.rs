//! 存储接口定义
//!
//! 邀请码的持久化与原子预留，支持内存和SQLite实现

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::invitation_code::{InviteCode, Reservation};
use crate::domain::user::ProvisionedUser;

pub use memory::MemoryStore;

/// 存储错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("invitation code not found")]
    NotFound,

    #[error("invitation code expired")]
    Expired,

    #[error("invitation code exhausted")]
    Exhausted,

    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 邀请码存储接口
///
/// `reserve_and_decrement` 必须是原子的条件更新：同一个码剩余 1 次时，
/// 并发调用中只有一个成功，其余得到 `Exhausted`。实现不能依赖进程内锁
/// 来保证这一点，因为多个服务实例可能共享同一个存储。
#[async_trait]
pub trait InviteStore: Send + Sync {
    /// 按码查找邀请码
    async fn lookup(&self, code: &str) -> StoreResult<InviteCode>;

    /// 预留一次使用（有限次数的码剩余次数减一）
    async fn reserve_and_decrement(&self, code: &str) -> StoreResult<Reservation>;

    /// 归还预留
    ///
    /// 只有真正恢复了次数的那次调用返回 `true`；重复归还或在 `confirm`
    /// 之后归还都不会改变任何数据。
    async fn release(&self, reservation: &Reservation) -> StoreResult<bool>;

    /// 确认预留，之后不可再归还
    async fn confirm(&self, reservation: &Reservation, user_id: &str) -> StoreResult<()>;

    /// 保存邀请码（覆盖同码记录）
    async fn save_invite(&self, invite: &InviteCode) -> StoreResult<()>;

    /// 保存开通成功的用户
    async fn save_user(&self, user: &ProvisionedUser) -> StoreResult<()>;

    /// 查找用户名或邮箱冲突的用户
    async fn find_user(&self, username: &str, email: &str) -> StoreResult<Option<ProvisionedUser>>;

    /// 加载所有用户
    async fn load_users(&self) -> StoreResult<Vec<ProvisionedUser>> {
        // 默认实现，子类可以重写
        Ok(vec![])
    }
}
