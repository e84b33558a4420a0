//! Uploader configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/micloud/config.toml`
//! - Windows: `%APPDATA%/micloud/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use micloud_client::ClientConfig;
use micloud_protocol::constants::{DEFAULT_BASE_URL, ROOT_FOLDER_ID};
use micloud_upload::UploadOptions;
use serde::{Deserialize, Serialize};

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// `serviceToken` cookie of a logged-in web session.
    #[serde(default)]
    pub service_token: String,

    /// `userId` cookie of the same session.
    #[serde(default)]
    pub user_id: String,

    /// API host.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Folder uploads land in when `--parent` is not given.
    #[serde(default = "default_parent_id")]
    pub parent_id: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Bound on the negotiation and commit requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bound on each block transfer.
    #[serde(default = "default_block_timeout")]
    pub block_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_parent_id() -> String {
    ROOT_FOLDER_ID.into()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_block_timeout() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_token: String::new(),
            user_id: String::new(),
            base_url: default_base_url(),
            parent_id: default_parent_id(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            block_timeout_secs: default_block_timeout(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or writes a default there if absent.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!(path = %path.display(), "created default configuration");
            Ok(config)
        }
    }

    /// Writes the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // The file holds session cookies.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.service_token.is_empty() && !self.user_id.is_empty()
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            block_timeout: Duration::from_secs(self.block_timeout_secs),
            ..UploadOptions::default()
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Some(Duration::from_secs(
                self.request_timeout_secs.max(self.block_timeout_secs),
            )),
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| anyhow::anyhow!("APPDATA is not set; pass --config"))?;
        Ok(PathBuf::from(appdata).join("micloud").join("config.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME")
            .map_err(|_| anyhow::anyhow!("HOME is not set; pass --config"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("micloud")
            .join("config.toml"))
    }
}
