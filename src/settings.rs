use anyhow::{anyhow, Result};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tenant_chat::messaging::ApiConfig;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3333";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Stored session identity plus backend settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: default_base_url(),
            user_id: None,
            token: None,
            timeout_secs: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl Settings {
    /// Apply TENANT_CHAT_* environment variables on top of the stored values
    pub fn apply_env(mut self) -> Self {
        if let Ok(base_url) = env::var("TENANT_CHAT_BASE_URL") {
            self.base_url = base_url;
        }
        if let Ok(user_id) = env::var("TENANT_CHAT_USER_ID") {
            self.user_id = Some(user_id);
        }
        if let Ok(token) = env::var("TENANT_CHAT_TOKEN") {
            self.token = Some(token);
        }
        self
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

static CONFIG_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

pub fn set_config_dir_override(dir: PathBuf) {
    if CONFIG_DIR_OVERRIDE.set(dir).is_err() {
        log::warn!("Config directory override already set, ignoring");
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = match CONFIG_DIR_OVERRIDE.get() {
        Some(dir) => dir.clone(),
        None => dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("tenant-chat"),
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("session.json"))
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, settings)?;

    info!("Settings saved to {}", path.display());
    Ok(())
}

pub fn load_settings(path: &Path) -> Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&contents)?;
    info!("Loaded settings from {}", path.display());

    Ok(Some(settings))
}
