//! 邀请码相关模型

use serde::{Deserialize, Serialize};

/// 媒体服务器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Emby,
    Jellyfin,
}

impl ServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::Emby => "emby",
            ServerType::Jellyfin => "jellyfin",
        }
    }

    /// 面向用户的名称
    pub fn display_name(&self) -> &'static str {
        match self {
            ServerType::Emby => "Emby",
            ServerType::Jellyfin => "Jellyfin",
        }
    }
}

impl std::str::FromStr for ServerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "emby" => Ok(ServerType::Emby),
            "jellyfin" => Ok(ServerType::Jellyfin),
            _ => Err(format!("Unknown server type: {}", s)),
        }
    }
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 邀请码的使用额度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "max", rename_all = "lowercase")]
pub enum InviteUsage {
    /// 最多可兑换 n 次（n >= 1）
    Limited(u32),
    /// 不限次数
    Unlimited,
}

/// 邀请码模型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteCode {
    pub code: String,
    pub server_type: ServerType,
    pub max_uses: InviteUsage,
    pub uses_remaining: u32,         // Unlimited 时不参与判断
    pub expires_at: Option<i64>,     // 过期时间戳（秒），None 表示永不过期
    pub created_at: i64,
    pub libraries: Vec<String>,      // 媒体库 ID 或名称，空表示全部
    pub duration_days: Option<u32>,  // 开通账号的有效天数
}

impl InviteCode {
    /// 创建一个随机码的邀请码
    pub fn new(server_type: ServerType, max_uses: InviteUsage) -> Self {
        Self::with_code(Self::generate_code(), server_type, max_uses)
    }

    /// 使用指定的码创建邀请码
    pub fn with_code(code: impl Into<String>, server_type: ServerType, max_uses: InviteUsage) -> Self {
        let uses_remaining = match max_uses {
            InviteUsage::Limited(n) => n.max(1),
            InviteUsage::Unlimited => 0,
        };
        let max_uses = match max_uses {
            InviteUsage::Limited(n) => InviteUsage::Limited(n.max(1)),
            InviteUsage::Unlimited => InviteUsage::Unlimited,
        };

        Self {
            code: code.into(),
            server_type,
            max_uses,
            uses_remaining,
            expires_at: None,
            created_at: chrono::Utc::now().timestamp(),
            libraries: Vec::new(),
            duration_days: None,
        }
    }

    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.expires_at = Some(timestamp);
        self
    }

    pub fn with_libraries(mut self, libraries: Vec<String>) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn with_duration_days(mut self, days: u32) -> Self {
        self.duration_days = Some(days);
        self
    }

    /// 生成随机邀请码（10位大写字母数字组合）
    fn generate_code() -> String {
        use rand::{distributions::Alphanumeric, Rng};
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect()
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self.max_uses, InviteUsage::Unlimited)
    }

    /// 给定时刻是否已过期
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    pub fn is_exhausted(&self) -> bool {
        !self.is_unlimited() && self.uses_remaining == 0
    }

    /// 检查邀请码是否可兑换（未过期且仍有剩余次数）
    pub fn is_redeemable(&self) -> bool {
        !self.is_expired() && !self.is_exhausted()
    }

    /// 归还一次使用次数，不超过最大次数
    pub fn restore_use(&mut self) {
        if let InviteUsage::Limited(max) = self.max_uses {
            self.uses_remaining = (self.uses_remaining + 1).min(max);
        }
    }
}

/// 预留凭证
///
/// `reserve_and_decrement` 成功后返回，`release` / `confirm` 以此为准，
/// 同一个预留最多归还一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: String,
    pub code: String,
    pub created_at: i64,
}

impl Reservation {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code: code.into(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// 预留状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Pending,
    Released,
    Confirmed,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Pending => "pending",
            ReservationState::Released => "released",
            ReservationState::Confirmed => "confirmed",
        }
    }
}
