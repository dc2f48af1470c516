//! 服务共享状态：当前设置快照与转移 pin 表。

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::RwLock;
use tracing::info;

use crate::{
    auth::registry::AccountRegistry,
    config::{ConfigError, ServerConfig, load_config},
    host::HostPermissions,
    transfer::TransferTable,
};

/// 一次完整加载的设置：配置本体与由它派生的只读索引。
#[derive(Debug)]
pub(crate) struct LoadedSettings {
    pub(crate) config: ServerConfig,
    pub(crate) registry: AccountRegistry,
    pub(crate) hosts: HostPermissions,
}

impl LoadedSettings {
    /// 读取设置文件并构建全部派生索引。
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_config(load_config(path)?)
    }

    pub(crate) fn from_config(config: ServerConfig) -> Result<Self, ConfigError> {
        let registry = AccountRegistry::load(&config.auth_accounts)?;
        let hosts = HostPermissions::build(&config.bind_info.host_level_permissions)?;
        Ok(Self {
            config,
            registry,
            hosts,
        })
    }
}

/// 服务共享状态。
#[derive(Clone)]
pub(crate) struct AppState {
    /// 当前设置快照；重载时整体替换内层 `Arc`。
    settings: Arc<RwLock<Arc<LoadedSettings>>>,
    /// 设置文件路径（重载用）。
    settings_path: Arc<PathBuf>,
    /// 转移 pin 表（内存）。
    pub(crate) transfers: TransferTable,
}

impl AppState {
    pub(crate) fn new(settings_path: PathBuf, settings: LoadedSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(Arc::new(settings))),
            settings_path: Arc::new(settings_path),
            transfers: TransferTable::default(),
        }
    }

    /// 取当前快照；请求在整个生命周期内只使用这一份。
    pub(crate) async fn snapshot(&self) -> Arc<LoadedSettings> {
        self.settings.read().await.clone()
    }

    /// 重新读取设置文件；失败时保留旧快照。
    pub(crate) async fn reload(&self) -> Result<(), ConfigError> {
        let next = LoadedSettings::load(&self.settings_path)?;
        next.config.warn_ignored();
        let accounts = next.registry.len();
        *self.settings.write().await = Arc::new(next);
        info!(
            "settings reloaded from {} ({accounts} registered keys)",
            self.settings_path.display()
        );
        Ok(())
    }
}
