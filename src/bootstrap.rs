//! 服务装配与启动
//!
//! 根据配置创建存储、注册媒体服务器后端、组装兑换服务并启动 Web 服务器

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::application::redemption::{FormRules, RedemptionService};
use crate::config::{AppConfig, StoreType};
use crate::core::backend::BackendRegistry;
use crate::core::provisioner::AccountProvisioner;
use crate::core::store::{InviteStore, MemoryStore};
use crate::errors::{Result, WizarrError};
use crate::infrastructure::media::{EmbyBackend, JellyfinBackend};
use crate::infrastructure::store::SqliteStore;
use crate::infrastructure::web::{start_web_server, AppState};

/// 启动器
pub struct Launcher {
    config: AppConfig,
}

impl Launcher {
    pub fn with_config(config: AppConfig) -> Self {
        Self { config }
    }

    /// 校验配置并启动服务
    pub async fn launch(&self) -> Result<()> {
        self.config.validate()?;
        let state = self.build_state()?;

        start_web_server(&self.config.bind_addr, state)
            .await
            .map_err(|e| WizarrError::NetworkError(e.to_string()))
    }

    /// 创建存储
    pub fn build_store(&self) -> Result<Arc<dyn InviteStore>> {
        match self.config.store_type {
            StoreType::Memory => {
                info!("Using in-memory invite store");
                Ok(Arc::new(MemoryStore::new()))
            }
            StoreType::Sqlite => {
                let path = Path::new(&self.config.database_path);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                info!("Using SQLite invite store at {}", path.display());
                Ok(Arc::new(SqliteStore::new(path)?))
            }
        }
    }

    /// 注册已配置的媒体服务器后端
    pub fn build_backends(&self) -> Result<BackendRegistry> {
        let timeout = Duration::from_secs(self.config.backend_timeout_secs);
        let registry = BackendRegistry::new();

        if let Some((url, key)) = self.config.emby_config() {
            let backend = EmbyBackend::new(url, key, timeout)
                .map_err(|e| WizarrError::BackendError(e.to_string()))?;
            registry.register(Arc::new(backend))?;
            info!("Emby backend enabled at {}", url);
        }

        if let Some((url, key)) = self.config.jellyfin_config() {
            let backend = JellyfinBackend::new(url, key, timeout)
                .map_err(|e| WizarrError::BackendError(e.to_string()))?;
            registry.register(Arc::new(backend))?;
            info!("Jellyfin backend enabled at {}", url);
        }

        if registry.is_empty() {
            return Err(WizarrError::ConfigError(
                "no media server backend configured".to_string(),
            ));
        }
        Ok(registry)
    }

    /// 组装 Web 层状态
    pub fn build_state(&self) -> Result<Arc<AppState>> {
        let store = self.build_store()?;
        let backends = Arc::new(self.build_backends()?);

        let provisioner = AccountProvisioner::new(store.clone(), backends)
            .with_timeout(Duration::from_secs(self.config.provision_timeout_secs));
        let redemption = RedemptionService::new(Arc::new(provisioner)).with_rules(FormRules {
            min_password_len: self.config.min_password_len,
            max_password_len: self.config.max_password_len,
        });

        Ok(Arc::new(AppState {
            redemption: Arc::new(redemption),
            store,
        }))
    }
}
