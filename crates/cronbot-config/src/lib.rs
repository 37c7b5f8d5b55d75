use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Config file not found at {0}")]
    Missing(PathBuf),
}

/// Telegram transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token.
    pub bot_token: String,
    /// The single chat allowed to issue commands; all reports go here.
    pub chat_id: i64,
}

/// Top-level cronbot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronbotConfig {
    /// Telegram transport config.
    pub telegram: TelegramConfig,
    /// IANA timezone name used for cron evaluation and one-shot time
    /// parsing. UTC when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Seconds between due-task scans.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_tick_secs() -> u64 {
    30
}

/// Resolve the cronbot data directory: `$CRONBOT_DIR` if set, else
/// `~/.cronbot/`.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("CRONBOT_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(".cronbot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (`<dir>/config.json5`).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Resolve the schedule database path (`<dir>/cron.db`).
pub fn db_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("cron.db"))
}

/// Load configuration from the default path.
///
/// A missing config file is an error here: the bot token and chat id have
/// no usable defaults.
pub fn load_config() -> Result<CronbotConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path.
pub fn load_config_from(path: &Path) -> Result<CronbotConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: CronbotConfig = json5::from_str(&content)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Ensure the data directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json5_parse() {
        let json5_str = r#"{
            telegram: {
                bot_token: "123:ABC",
                chat_id: -1001234,
            },
            timezone: "Europe/Amsterdam",
        }"#;
        let config: CronbotConfig = json5::from_str(json5_str).unwrap();
        assert_eq!(config.telegram.bot_token, "123:ABC");
        assert_eq!(config.telegram.chat_id, -1001234);
        assert_eq!(config.timezone.as_deref(), Some("Europe/Amsterdam"));
        assert_eq!(config.tick_secs, 30);
    }

    #[test]
    fn test_json5_parse_overrides_tick() {
        let json5_str = r#"{
            telegram: { bot_token: "t", chat_id: 1 },
            tick_secs: 5,
        }"#;
        let config: CronbotConfig = json5::from_str(json5_str).unwrap();
        assert!(config.timezone.is_none());
        assert_eq!(config.tick_secs, 5);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config_from(Path::new("/nonexistent/config.json5")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_missing_telegram_section_fails() {
        let result: Result<CronbotConfig, _> = json5::from_str("{}");
        assert!(result.is_err());
    }
}
