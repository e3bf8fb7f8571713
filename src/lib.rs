//! 媒体服务器邀请兑换服务
//!
//! 新用户凭邀请码在自托管的 Emby / Jellyfin 上创建账号：
//! - 邀请码校验与原子预留（并发提交不会超额兑换）
//! - 按邀请码的服务器类型选择后端适配器
//! - 后端失败时归还预留（补偿），不浪费邀请次数
//!
//! # 架构分层
//!
//! - `domain`: 领域模型
//! - `core`: 存储与后端抽象、开通编排
//! - `infrastructure`: 基础设施层，SQLite、媒体服务器 HTTP、Web
//! - `application`: 应用层，表单兑换

// 领域层
pub mod domain;

// 核心层
pub mod core;

// 基础设施层
pub mod infrastructure;

// 应用层
pub mod application;

pub mod bootstrap;
pub mod config;
pub mod errors;

// 重新导出常用类型
pub use crate::application::redemption::{FormRules, JoinForm, RedemptionOutcome, RedemptionService};
pub use crate::config::{AppConfig, StoreType};
pub use crate::core::backend::{BackendError, BackendRegistry, MediaBackend};
pub use crate::core::provisioner::AccountProvisioner;
pub use crate::core::store::{InviteStore, MemoryStore, StoreError};
pub use crate::domain::{
    FailureReason, InviteCode, InviteUsage, NewAccount, ProvisionedUser, ProvisioningRequest,
    ProvisioningResult, Reservation, ServerType,
};
pub use crate::errors::WizarrError;
pub use crate::infrastructure::media::{EmbyBackend, JellyfinBackend};
pub use crate::infrastructure::store::SqliteStore;

/// 版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
