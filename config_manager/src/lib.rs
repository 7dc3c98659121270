use directories::ProjectDirs;
use microsoft_auth::{AuthSettings, DEFAULT_SCOPE, Endpoints};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;

const CONFIG_VERSION: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory unavailable")]
    ConfigDirMissing,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("persist error: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Azure application id used for device-code sign-in.
    #[serde(default)]
    pub microsoft_client_id: Option<String>,
    /// OAuth scopes requested with the device code.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Open the verification page in the default browser.
    #[serde(default = "default_true")]
    pub open_browser: bool,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            microsoft_client_id: None,
            scope: default_scope(),
            open_browser: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Per-request timeout, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Service URLs; entries left out keep the public defaults.
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
            endpoints: Endpoints::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            accounts: AccountsConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl LoginConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file()?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let mut config: LoginConfig = serde_json::from_str(&content)?;
        migrate(&mut config);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = NamedTempFile::new_in(path.parent().ok_or(ConfigError::ConfigDirMissing)?)?;
        tmp.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }

    /// Settings for the authenticator, or `None` while no client id is set.
    pub fn auth_settings(&self) -> Option<AuthSettings> {
        let client_id = self
            .accounts
            .microsoft_client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())?;

        Some(AuthSettings {
            client_id: client_id.to_string(),
            scope: self.accounts.scope.clone(),
            endpoints: self.network.endpoints.clone(),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.network.http_timeout_secs.max(1))
    }
}

pub fn config_file() -> Result<PathBuf, ConfigError> {
    let dirs = ProjectDirs::from("com", "fastmc", "fastmc").ok_or(ConfigError::ConfigDirMissing)?;
    Ok(dirs.config_dir().join("login.json"))
}

fn migrate(config: &mut LoginConfig) {
    if config.version < CONFIG_VERSION {
        if config.accounts.scope.trim().is_empty() {
            config.accounts.scope = default_scope();
        }
        config.version = CONFIG_VERSION;
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_true() -> bool {
    true
}
