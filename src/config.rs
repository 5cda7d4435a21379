use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Directory for state files (logs, triggers, allow-list). Defaults to current directory.
    data_dir: Option<String>,
    /// Allow-list YAML file. Defaults to `<data_dir>/allowed_groups.yml`.
    allowed_groups_file: Option<String>,
    /// Directory of per-group trigger files. Defaults to `<data_dir>/triggers`.
    triggers_dir: Option<String>,
    /// Seconds between allow-list file checks.
    #[serde(default = "default_reload_interval_secs")]
    reload_interval_secs: u64,
    #[serde(default)]
    dry_run: bool,
}

fn default_reload_interval_secs() -> u64 {
    5
}

pub struct Config {
    pub telegram_bot_token: String,
    pub data_dir: PathBuf,
    pub allowed_groups_file: PathBuf,
    pub triggers_dir: PathBuf,
    /// How often the allow-list watcher stats its file.
    pub reload_interval: Duration,
    /// Log replies instead of sending them.
    pub dry_run: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.reload_interval_secs == 0 {
            return Err(ConfigError::Validation("reload_interval_secs must be at least 1".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let allowed_groups_file = file
            .allowed_groups_file
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("allowed_groups.yml"));
        let triggers_dir = file
            .triggers_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("triggers"));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            data_dir,
            allowed_groups_file,
            triggers_dir,
            reload_interval: Duration::from_secs(file.reload_interval_secs),
            dry_run: file.dry_run,
        })
    }
}
