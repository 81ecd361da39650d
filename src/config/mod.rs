use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const SERVER_ENV: &str = "BTP_MEETINGS_SERVER";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub reports: ReportsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Use the token-protected `/api/...` routes instead of the root aliases.
    pub api_prefix: bool,
    /// Applies to connection setup only. Uploads and report streams can run
    /// for as long as the backend needs.
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub download_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: false,
            connect_timeout_seconds: 10,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds.max(1))
    }
}

impl ReportsConfig {
    pub fn resolve_download_dir(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => global::default_download_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config = Self::parse(&content)?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply the environment and command-line server overrides, flag last.
    pub fn apply_server_override(&mut self, flag: Option<&str>) {
        let env = std::env::var(SERVER_ENV).ok();
        let url = flag
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .or_else(|| {
                env.map(|url| url.trim().to_string())
                    .filter(|url| !url.is_empty())
            });
        if let Some(url) = url {
            self.server.base_url = url;
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
