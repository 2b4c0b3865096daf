use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::ensure_parent_dir;

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";

pub const ENV_DATABASE: &str = "EVENT_CHAT_DB";
pub const ENV_ATTACHMENTS: &str = "EVENT_CHAT_ATTACHMENTS";
pub const ENV_USER: &str = "EVENT_CHAT_USER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_attachments_dir")]
    pub attachments_dir: String,
    /// Snapshots buffered per live subscription.
    #[serde(default = "default_subscription_buffer")]
    pub subscription_buffer: usize,
    /// 0 disables the periodic unread reconciliation.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    #[serde(default)]
    pub default_user: Option<String>,
}

fn default_database_path() -> String {
    "data/chat.db".to_string()
}

fn default_attachments_dir() -> String {
    "data/attachments".to_string()
}

fn default_subscription_buffer() -> usize {
    32
}

fn default_reconcile_interval() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            attachments_dir: default_attachments_dir(),
            subscription_buffer: default_subscription_buffer(),
            reconcile_interval_secs: default_reconcile_interval(),
            default_user: None,
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

/// Apply `EVENT_CHAT_*` variables (from the process or `.env`).
pub fn apply_env_overrides(config: AppConfig) -> AppConfig {
    overrides_from(config, |name| std::env::var(name).ok())
}

fn overrides_from(mut config: AppConfig, lookup: impl Fn(&str) -> Option<String>) -> AppConfig {
    let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(path) = lookup(ENV_DATABASE) {
        config.database_path = path;
    }
    if let Some(dir) = lookup(ENV_ATTACHMENTS) {
        config.attachments_dir = dir;
    }
    if let Some(user) = lookup(ENV_USER) {
        config.default_user = Some(user);
    }
    config
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}
