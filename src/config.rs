use clap::Parser;

use crate::errors::{Result, WizarrError};
use crate::infrastructure::media::MAX_REQUESTS_PER_ACCOUNT;

/// 存储类型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreType {
    /// 内存存储（重启后丢失）
    Memory,
    /// SQLite 文件存储
    Sqlite,
}

impl std::str::FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreType::Memory),
            "sqlite" => Ok(StoreType::Sqlite),
            _ => Err(format!("Unknown store type: {}", s)),
        }
    }
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreType::Memory => write!(f, "memory"),
            StoreType::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Invite redemption and account provisioning for Emby and Jellyfin"
)]
pub struct AppConfig {
    /// HTTP 监听地址
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5690")]
    pub bind_addr: String,

    // 存储配置
    /// 存储类型: memory, sqlite
    #[arg(long, env = "STORE_TYPE", default_value = "sqlite")]
    pub store_type: StoreType,

    /// SQLite 数据库路径（仅在 sqlite 存储类型下使用）
    #[arg(long, env = "DATABASE_PATH", default_value = "./data/wizarr.db")]
    pub database_path: String,

    // Emby 配置
    #[arg(long, env = "EMBY_URL")]
    pub emby_url: Option<String>,

    #[arg(long, env = "EMBY_API_KEY")]
    pub emby_api_key: Option<String>,

    // Jellyfin 配置
    #[arg(long, env = "JELLYFIN_URL")]
    pub jellyfin_url: Option<String>,

    #[arg(long, env = "JELLYFIN_API_KEY")]
    pub jellyfin_api_key: Option<String>,

    /// 单个后端 HTTP 请求的超时（秒）
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 10)]
    pub backend_timeout_secs: u64,

    /// 一次开通流程的总超时（秒），不能短于适配器全部请求的超时之和
    #[arg(long, env = "PROVISION_TIMEOUT_SECS", default_value_t = 60)]
    pub provision_timeout_secs: u64,

    // 表单规则
    #[arg(long, env = "MIN_PASSWORD_LEN", default_value_t = 8)]
    pub min_password_len: usize,

    #[arg(long, env = "MAX_PASSWORD_LEN", default_value_t = 20)]
    pub max_password_len: usize,
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.emby_config().is_none() && self.jellyfin_config().is_none() {
            return Err(WizarrError::ConfigError(
                "at least one of EMBY_URL/EMBY_API_KEY or JELLYFIN_URL/JELLYFIN_API_KEY is required"
                    .to_string(),
            ));
        }

        if self.min_password_len == 0 || self.min_password_len > self.max_password_len {
            return Err(WizarrError::ConfigError(format!(
                "invalid password length bounds: {}..={}",
                self.min_password_len, self.max_password_len
            )));
        }

        if self.backend_timeout_secs == 0 || self.provision_timeout_secs == 0 {
            return Err(WizarrError::ConfigError("timeouts must be positive".to_string()));
        }

        let adapter_budget = self.backend_timeout_secs.saturating_mul(MAX_REQUESTS_PER_ACCOUNT);
        if self.provision_timeout_secs < adapter_budget {
            return Err(WizarrError::ConfigError(format!(
                "provision timeout ({}s) must be at least {}s ({} requests x {}s backend timeout)",
                self.provision_timeout_secs,
                adapter_budget,
                MAX_REQUESTS_PER_ACCOUNT,
                self.backend_timeout_secs
            )));
        }

        Ok(())
    }

    /// 获取 Emby 配置（URL 和 API Key 都设置时可用）
    pub fn emby_config(&self) -> Option<(&str, &str)> {
        match (self.emby_url.as_deref(), self.emby_api_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Some((url, key)),
            _ => None,
        }
    }

    /// 获取 Jellyfin 配置（URL 和 API Key 都设置时可用）
    pub fn jellyfin_config(&self) -> Option<(&str, &str)> {
        match (self.jellyfin_url.as_deref(), self.jellyfin_api_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Some((url, key)),
            _ => None,
        }
    }
}
