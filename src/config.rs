//! Configuration management for astro-live.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chart::ChartApiSettings;
use crate::cli::Args;
use crate::live::{LiveSettings, ReconnectPolicy, MAX_RECONNECT_ATTEMPTS};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Astrology API settings.
    pub chart_api: ChartApiSettings,
    /// Live model settings.
    pub live: LiveSettings,
    /// Reconnect policy.
    pub reconnect: ReconnectSection,
    /// Local store settings.
    pub storage: StorageSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Reconnect policy section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    /// Consecutive failures before the session manager stops.
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds.
    pub delay_ms: u64,
    /// Liveness polling interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            delay_ms: 2000,
            poll_interval_ms: 1000,
        }
    }
}

/// Local store section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Path of the JSON store file.
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("astro-live.json"),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| var(name).filter(|v| !v.is_empty());

        if let Some(key) = non_empty("ASTRO_LIVE_API_KEY") {
            self.chart_api.api_key = Some(key);
        }
        if let Some(key) = non_empty("ASTRO_LIVE_GEMINI_KEY") {
            self.live.api_key = Some(key);
        }
        if let Some(language) = non_empty("ASTRO_LIVE_LANGUAGE") {
            self.live.language = language;
        }
        if let Some(voice) = non_empty("ASTRO_LIVE_VOICE") {
            self.live.voice = voice;
        }
        if let Some(path) = non_empty("ASTRO_LIVE_STORE") {
            self.storage.path = PathBuf::from(path);
        }

        if let Some(level) = non_empty("ASTRO_LIVE_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = non_empty("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref path) = args.store {
            self.storage.path = path.clone();
        }
        if let Some(timezone) = args.timezone {
            self.chart_api.timezone = timezone;
        }
        if let Some(ref language) = args.language {
            self.live.language = language.clone();
        }
        if let Some(ref voice) = args.voice {
            self.live.voice = voice.clone();
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Config::default();

        // Load from config file if specified
        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        // Apply environment variable overrides
        config.apply_env();

        // Apply CLI argument overrides (highest priority)
        config.apply_args(args);

        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "reconnect.max_attempts",
                "0".to_string(),
            ));
        }
        if self.reconnect.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "reconnect.poll_interval_ms",
                "0".to_string(),
            ));
        }
        Ok(())
    }

    /// Reconnect policy for the session manager.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect.max_attempts,
            delay: Duration::from_millis(self.reconnect.delay_ms),
            poll_interval: Duration::from_millis(self.reconnect.poll_interval_ms),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A value outside its allowed range.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue(name, value) => write!(f, "invalid {}: {}", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.live.language, "Nepali");
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.storage.path, PathBuf::from("astro-live.json"));
        assert_eq!(config.chart_api.timezone, 5.75);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "chart_api": {
                "base_url": "http://localhost:9000",
                "api_key": "chart-key"
            },
            "live": {
                "voice": "Puck",
                "modality": "text"
            },
            "reconnect": {
                "max_attempts": 3,
                "delay_ms": 500
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.chart_api.base_url, "http://localhost:9000");
        assert_eq!(config.chart_api.api_key.as_deref(), Some("chart-key"));
        assert_eq!(config.chart_api.request_timeout_secs, 15); // Default
        assert_eq!(config.live.voice, "Puck");
        assert_eq!(config.live.language, "Nepali"); // Default
        assert_eq!(config.live.modality, crate::live::ResponseModality::Text);

        let policy = config.reconnect_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert_eq!(policy.poll_interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/astro-live.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ASTRO_LIVE_API_KEY", "chart"),
            ("ASTRO_LIVE_GEMINI_KEY", "gemini"),
            ("ASTRO_LIVE_LANGUAGE", "Hindi"),
            ("ASTRO_LIVE_STORE", "/tmp/store.json"),
            ("ASTRO_LIVE_VOICE", ""),
            ("RUST_LOG", "trace"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.chart_api.api_key.as_deref(), Some("chart"));
        assert_eq!(config.live.api_key.as_deref(), Some("gemini"));
        assert_eq!(config.live.language, "Hindi");
        assert_eq!(config.live.voice, "Zephyr");
        assert_eq!(config.storage.path, PathBuf::from("/tmp/store.json"));
        assert_eq!(config.log_filter(), "trace");
    }

    #[test]
    fn test_log_level_env_beats_rust_log() {
        let mut config = Config::default();
        config.apply_env_from(|name| match name {
            "ASTRO_LIVE_LOG_LEVEL" => Some("warn".into()),
            "RUST_LOG" => Some("trace".into()),
            _ => None,
        });
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_env_from(|name| (name == "ASTRO_LIVE_LANGUAGE").then(|| "Hindi".into()));

        let args = Args {
            store: Some(PathBuf::from("custom.json")),
            language: Some("English".into()),
            timezone: Some(5.5),
            log_level: Some("debug".into()),
            ..Args::default()
        };
        config.apply_args(&args);

        assert_eq!(config.storage.path, PathBuf::from("custom.json"));
        assert_eq!(config.live.language, "English");
        assert_eq!(config.chart_api.timezone, 5.5);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.reconnect.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue("reconnect.max_attempts", _))
        ));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"chart_api\""));
        assert!(json.contains("\"max_attempts\""));
        assert!(json.contains("\"level\""));
    }
}
