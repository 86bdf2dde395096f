//! Strom Configuration
//!
//! Loads and saves the client configuration from `~/.strom/strom.json`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Directory name under the user's home for all strom data.
const STROM_DIR_NAME: &str = ".strom";

/// Config file name within the strom directory.
const CONFIG_FILENAME: &str = "strom.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StromConfig {
    /// Base URL of the agent backend.
    pub api_url: String,
    /// JSON-RPC endpoint used for payment transfers.
    pub rpc_url: String,
    /// Recipient address for the payment gate.
    pub payment_recipient: String,
    /// Deadline for each remote agent call, in seconds.
    pub request_timeout_secs: u64,
    /// Path to the local key-value database.
    pub db_path: String,
    pub log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for StromConfig {
    fn default() -> Self {
        StromConfig {
            api_url: "https://api.strom.app".to_string(),
            rpc_url: "https://mainnet.base.org".to_string(),
            payment_recipient: "0x36eb5050ae61902bbdb66a5d5b9b864b7bbd4d49".to_string(),
            request_timeout_secs: 30,
            db_path: "~/.strom/state.db".to_string(),
            log_level: LogLevel::Info,
        }
    }
}

/// Returns the strom base directory: `~/.strom`.
pub fn get_strom_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
    home.join(STROM_DIR_NAME)
}

/// Returns the full path to the config file: `~/.strom/strom.json`.
pub fn get_config_path() -> PathBuf {
    get_strom_dir().join(CONFIG_FILENAME)
}

/// Load the config from disk, merging unset fields with defaults.
///
/// Returns the defaults when the file does not exist or cannot be parsed.
pub fn load_config() -> StromConfig {
    let config_path = get_config_path();
    if !config_path.exists() {
        return StromConfig::default();
    }

    let contents = match fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(_) => return StromConfig::default(),
    };

    let mut config: StromConfig =
        serde_json::from_str(&contents).unwrap_or_else(|_| StromConfig::default());

    let defaults = StromConfig::default();
    if config.api_url.is_empty() {
        config.api_url = defaults.api_url;
    }
    if config.rpc_url.is_empty() {
        config.rpc_url = defaults.rpc_url;
    }
    if config.payment_recipient.is_empty() {
        config.payment_recipient = defaults.payment_recipient;
    }
    if config.request_timeout_secs == 0 {
        config.request_timeout_secs = defaults.request_timeout_secs;
    }
    if config.db_path.is_empty() {
        config.db_path = defaults.db_path;
    }

    config
}

/// Save the config to disk at `~/.strom/strom.json`.
///
/// Creates the strom directory with mode 0o700 if it does not exist.
pub fn save_config(config: &StromConfig) -> Result<()> {
    let dir = get_strom_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create strom directory")?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    }

    let config_path = get_config_path();
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(&config_path, &json).context("Failed to write config file")?;
    fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

/// Resolve a path that may start with `~` to an absolute path.
pub fn resolve_path(p: &str) -> String {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest).to_string_lossy().to_string()
    } else {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path_with_tilde() {
        let resolved = resolve_path("~/some/path");
        assert!(!resolved.starts_with('~'));
        assert!(resolved.ends_with("some/path"));
    }

    #[test]
    fn test_resolve_path_without_tilde() {
        let path = "/absolute/path/to/file";
        assert_eq!(resolve_path(path), path);
    }

    #[test]
    fn test_defaults_merge_on_empty_fields() {
        let parsed: StromConfig =
            serde_json::from_str(r#"{"apiUrl": "https://example.test"}"#).unwrap();
        assert_eq!(parsed.api_url, "https://example.test");
        assert_eq!(parsed.request_timeout_secs, 30);
        assert_eq!(parsed.log_level, LogLevel::Info);
    }
}
