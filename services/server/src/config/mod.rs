//! 配置模块职责：
//! 1. 读取 JSON 设置文件并为缺省段落补默认值。
//! 2. 将树节点与日志目录中的相对路径解析到设置文件所在目录。
//! 3. 定义启动期致命的配置错误。

mod ordered;

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::tree::TreeNode;

pub(crate) use ordered::OrderedMap;

/// 默认设置文件名（相对当前工作目录）。
pub(crate) const DEFAULT_SETTINGS_FILE: &str = "settings.json";
/// 设置文件路径环境变量。
pub(crate) const SETTINGS_ENV: &str = "TS_SETTINGS";
/// 本机回环连接使用的权限桶名。
pub(crate) const LOCALHOST_PERMISSION_KEY: &str = "localhost";
/// 兜底权限桶名。
pub(crate) const WILDCARD_PERMISSION_KEY: &str = "*";

/// 配置错误：全部在启动（或重载）期抛出，进程不得带着它继续服务。
#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("read settings {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(
        "duplicate key/username pair: user {username:?} in account {account:?} reuses a public key already registered to {existing:?}"
    )]
    DuplicateKeyUser {
        account: String,
        username: String,
        existing: String,
    },
    #[error("invalid public key for user {username:?} in account {account:?}")]
    InvalidPublicKey { account: String, username: String },
    #[error("invalid hostLevelPermissions key {0:?}")]
    InvalidHostPattern(String),
}

/// 服务端设置（设置文件顶层）。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerConfig {
    pub(crate) tree: TreeNode,
    #[serde(default)]
    pub(crate) bind_info: BindInfo,
    #[serde(default)]
    pub(crate) auth_accounts: BTreeMap<String, AuthAccountConfig>,
    #[serde(default = "default_cookie_age")]
    pub(crate) auth_cookie_age: u64,
    #[serde(default)]
    pub(crate) auth_cookie_secure: bool,
    #[serde(default)]
    pub(crate) putsaver: PutsaverConfig,
    #[serde(default)]
    pub(crate) directory_index: DirectoryIndexConfig,
    #[serde(default)]
    pub(crate) logging: LoggingConfig,
}

fn default_cookie_age() -> u64 {
    ts_shared_protocol::DEFAULT_AUTH_COOKIE_AGE_SEC
}

/// 监听地址与按地址划分的权限桶。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BindInfo {
    #[serde(default = "default_bind_address")]
    pub(crate) bind_address: Vec<String>,
    #[serde(default = "default_port")]
    pub(crate) port: u16,
    #[serde(default)]
    pub(crate) host_level_permissions: OrderedMap<HostPermission>,
}

impl Default for BindInfo {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            host_level_permissions: OrderedMap::default(),
        }
    }
}

fn default_bind_address() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

fn default_port() -> u16 {
    8080
}

/// 单个权限桶。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HostPermission {
    /// 未知公钥登录时是否打印注册提示。
    #[serde(default)]
    pub(crate) register_notice: bool,
    /// 是否接受 websocket 升级请求。
    #[serde(default = "default_true")]
    pub(crate) websockets: bool,
}

impl HostPermission {
    fn localhost_default() -> Self {
        Self {
            register_notice: true,
            websockets: true,
        }
    }

    fn wildcard_default() -> Self {
        Self {
            register_notice: false,
            websockets: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// 认证账户组。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthAccountConfig {
    /// username -> base64 公钥。
    #[serde(default)]
    pub(crate) client_keys: BTreeMap<String, String>,
    /// 口令账户：结构上接受，语义上未实现。
    #[serde(default)]
    pub(crate) passwords: BTreeMap<String, String>,
}

/// PUT 保存的 etag 校验模式。
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(from = "String")]
pub(crate) enum EtagMode {
    /// 从不校验。
    Disabled,
    /// 必须携带 If-Match。
    Required,
    /// 携带 If-Match 时才校验。
    #[default]
    Optional,
}

impl From<String> for EtagMode {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "disabled" => EtagMode::Disabled,
            "required" => EtagMode::Required,
            _ => EtagMode::Optional,
        }
    }
}

/// PUT 保存设置。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PutsaverConfig {
    #[serde(default)]
    pub(crate) etag: EtagMode,
    /// 允许过期 etag 的宽限窗口（秒），0 表示不宽限。
    #[serde(default)]
    pub(crate) etag_window: u64,
}

/// 目录索引渲染设置。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DirectoryIndexConfig {
    /// 为 false 时文件夹排在文件前面。
    #[serde(default = "default_true")]
    pub(crate) mix_folders: bool,
}

impl Default for DirectoryIndexConfig {
    fn default() -> Self {
        Self { mix_folders: true }
    }
}

/// 日志设置；环境变量优先于这里的值。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoggingConfig {
    #[serde(default)]
    pub(crate) log_dir: Option<PathBuf>,
    #[serde(default)]
    pub(crate) file_level: Option<String>,
    #[serde(default)]
    pub(crate) archive_interval_sec: Option<u64>,
}

/// 解析设置文件路径：显式参数 > `TS_SETTINGS` > 默认文件名。
pub(crate) fn settings_path(explicit: Option<&str>) -> PathBuf {
    explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var(SETTINGS_ENV)
                .ok()
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
}

/// 读取并归一化设置文件。
pub(crate) fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let raw = fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    config.normalize(base);
    Ok(config)
}

/// 仅做 JSON 解码（测试与重载共用）。
pub(crate) fn parse_config(raw: &[u8]) -> Result<ServerConfig, serde_json::Error> {
    serde_json::from_slice(raw)
}

impl ServerConfig {
    /// 补齐默认权限桶、解析相对路径。
    pub(crate) fn normalize(&mut self, base: &Path) {
        let permissions = &mut self.bind_info.host_level_permissions;
        permissions.insert_missing(LOCALHOST_PERMISSION_KEY, HostPermission::localhost_default());
        permissions.insert_missing(WILDCARD_PERMISSION_KEY, HostPermission::wildcard_default());

        self.tree.resolve_paths(base);
        if let Some(dir) = self.logging.log_dir.as_mut()
            && dir.is_relative()
        {
            *dir = base.join(&*dir);
        }
    }

    /// 配置了口令的账户名（口令登录未实现）。
    pub(crate) fn password_accounts(&self) -> impl Iterator<Item = &str> {
        self.auth_accounts
            .iter()
            .filter(|(_, entry)| !entry.passwords.is_empty())
            .map(|(account, _)| account.as_str())
    }

    /// 日志初始化之后调用，提示被忽略的配置项。
    pub(crate) fn warn_ignored(&self) {
        for account in self.password_accounts() {
            warn!("password login is not supported; ignoring passwords of account {account}");
        }
    }

    /// 按名称取权限桶；归一化之后 `localhost` 与 `*` 一定存在。
    pub(crate) fn permission(&self, key: &str) -> &HostPermission {
        let permissions = &self.bind_info.host_level_permissions;
        permissions
            .get(key)
            .or_else(|| permissions.get(WILDCARD_PERMISSION_KEY))
            .unwrap_or(&FALLBACK_PERMISSION)
    }
}

/// 未归一化配置的兜底桶：最保守的取值。
static FALLBACK_PERMISSION: HostPermission = HostPermission {
    register_notice: false,
    websockets: false,
};

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{EtagMode, LOCALHOST_PERMISSION_KEY, WILDCARD_PERMISSION_KEY, parse_config};

    const MINIMAL: &str = r#"{
        "tree": { "$element": "folder", "key": "", "path": "wiki" },
        "bindInfo": { "hostLevelPermissions": { "10.0.0.0/8": { "registerNotice": true } } },
        "putsaver": { "etag": "required", "etagWindow": 3 }
    }"#;

    #[test]
    fn defaults_fill_missing_sections() {
        let mut config = parse_config(MINIMAL.as_bytes()).expect("parse");
        config.normalize(Path::new("/srv"));

        assert_eq!(config.bind_info.port, 8080);
        assert_eq!(config.bind_info.bind_address, vec!["127.0.0.1"]);
        assert_eq!(config.auth_cookie_age, 2_592_000);
        assert!(!config.auth_cookie_secure);
        assert_eq!(config.putsaver.etag, EtagMode::Required);
        assert_eq!(config.putsaver.etag_window, 3);
        assert!(config.directory_index.mix_folders);

        let keys: Vec<_> = config.bind_info.host_level_permissions.keys().collect();
        assert_eq!(
            keys,
            vec!["10.0.0.0/8", LOCALHOST_PERMISSION_KEY, WILDCARD_PERMISSION_KEY]
        );
        assert!(config.permission(LOCALHOST_PERMISSION_KEY).register_notice);
        assert!(!config.permission(WILDCARD_PERMISSION_KEY).register_notice);
        assert!(config.permission("unknown").websockets);
    }

    #[test]
    fn unknown_etag_mode_means_optional() {
        assert_eq!(EtagMode::from("whatever".to_string()), EtagMode::Optional);
        assert_eq!(EtagMode::from("disabled".to_string()), EtagMode::Disabled);
    }

    #[test]
    fn password_accounts_are_reported_not_loaded() {
        let raw = r#"{
            "tree": { "$element": "group", "$children": [] },
            "authAccounts": {
                "legacy": { "passwords": { "bob": "hunter2" } },
                "keys": { "clientKeys": {} }
            }
        }"#;
        let config = parse_config(raw.as_bytes()).expect("parse");
        assert_eq!(config.password_accounts().collect::<Vec<_>>(), vec!["legacy"]);
    }

    #[test]
    fn relative_log_dir_follows_settings_dir() {
        let raw = r#"{
            "tree": { "$element": "group", "$children": [] },
            "logging": { "logDir": "logs" }
        }"#;
        let mut config = parse_config(raw.as_bytes()).expect("parse");
        config.normalize(Path::new("/etc/ts"));
        assert_eq!(
            config.logging.log_dir.as_deref(),
            Some(Path::new("/etc/ts/logs"))
        );
    }
}
