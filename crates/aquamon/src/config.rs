//! Configuration file parsing and structures.
//!
//! aquamon uses a single TOML file. Only `[source]` is required; every other
//! section falls back to defaults.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Record the original monitoring screen reads and writes.
pub const DEFAULT_RECORD_PATH: &str = "/FirebasePWI";

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub splash: SplashConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"aquamon::source" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the tracing filter for this configuration.
    pub fn targets(&self) -> Targets {
        self.overrides
            .iter()
            .fold(
                Targets::new().with_default(LevelFilter::from(self.level)),
                |targets, (target, level)| {
                    targets.with_target(target.clone(), LevelFilter::from(*level))
                },
            )
    }
}

fn default_record_path() -> String {
    DEFAULT_RECORD_PATH.to_string()
}

/// Remote record configuration
#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    /// Path of the record the dashboard mirrors and patches
    #[serde(default = "default_record_path")]
    pub record_path: String,

    /// Hosted Realtime Database backend
    #[serde(default)]
    pub firebase: Option<FirebaseConfig>,

    /// In-process backend for offline runs
    #[serde(default)]
    pub memory: Option<MemoryConfig>,
}

/// Hosted Realtime Database backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseConfig {
    /// Database URL, e.g. `https://<project>-default-rtdb.firebaseio.com`
    pub url: String,

    /// Database secret or ID token, sent as the `auth` query parameter
    #[serde(default)]
    pub auth: Option<String>,
}

/// In-process backend configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryConfig {
    /// JSON file holding the initial record
    #[serde(default)]
    pub seed: Option<PathBuf>,
}

fn default_splash_delay_ms() -> u64 {
    3000
}

#[derive(Debug, Deserialize)]
pub struct SplashConfig {
    /// How long the splash screen stays up before the dashboard replaces it
    #[serde(default = "default_splash_delay_ms")]
    pub delay_ms: u64,
}

impl Default for SplashConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_splash_delay_ms(),
        }
    }
}

impl SplashConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

/// HTTP API configuration
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_listen(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        contents.parse()
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source.record_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "source.record_path must start with '/', got '{}'",
                self.source.record_path
            )));
        }

        match (&self.source.firebase, &self.source.memory) {
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "one of [source.firebase] or [source.memory] is required".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(
                    "[source.firebase] and [source.memory] are mutually exclusive".to_string(),
                ));
            }
            _ => {}
        }

        if let Some(firebase) = &self.source.firebase {
            if !(firebase.url.starts_with("https://") || firebase.url.starts_with("http://")) {
                return Err(ConfigError::Invalid(format!(
                    "source.firebase.url must be an http(s) URL, got '{}'",
                    firebase.url
                )));
            }
        }

        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [source.memory]
        "#;

        let config: Config = toml.parse().unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.source.record_path, "/FirebasePWI");
        assert!(config.source.memory.is_some());
        assert_eq!(config.splash.delay(), Duration::from_millis(3000));
        assert!(!config.api.enabled);
        assert_eq!(config.api.port, 8565);
    }

    #[test]
    fn test_parse_firebase_config() {
        let toml = r#"
            [logging]
            level = "debug"

            [logging.overrides]
            "aquamon::source" = "trace"

            [source]
            record_path = "/Tank2"

            [source.firebase]
            url = "https://tank-default-rtdb.firebaseio.com"
            auth = "secret"

            [splash]
            delay_ms = 500

            [api]
            enabled = true
            port = 9000
        "#;

        let config: Config = toml.parse().unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.logging.overrides.get("aquamon::source"),
            Some(&LogLevel::Trace)
        );
        assert_eq!(config.source.record_path, "/Tank2");

        let firebase = config.source.firebase.as_ref().unwrap();
        assert_eq!(firebase.url, "https://tank-default-rtdb.firebaseio.com");
        assert_eq!(firebase.auth.as_deref(), Some("secret"));

        assert_eq!(config.splash.delay_ms, 500);
        assert!(config.api.enabled);
        assert_eq!(config.api.listen, "127.0.0.1");
        assert_eq!(config.api.port, 9000);
    }

    #[test]
    fn test_missing_source_section_is_parse_error() {
        let result: Result<Config, _> = "[logging]\nlevel = \"info\"".parse();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_backend_required() {
        let result: Result<Config, _> = "[source]\nrecord_path = \"/FirebasePWI\"".parse();
        let err = result.unwrap_err().to_string();
        assert!(err.contains("is required"), "unexpected error: {}", err);
    }

    #[test]
    fn test_backends_mutually_exclusive() {
        let toml = r#"
            [source.memory]
            [source.firebase]
            url = "https://tank-default-rtdb.firebaseio.com"
        "#;
        let err = toml.parse::<Config>().unwrap_err().to_string();
        assert!(err.contains("mutually exclusive"), "unexpected error: {}", err);
    }

    #[test]
    fn test_record_path_must_be_absolute() {
        let toml = r#"
            [source]
            record_path = "FirebasePWI"
            [source.memory]
        "#;
        let err = toml.parse::<Config>().unwrap_err().to_string();
        assert!(err.contains("record_path"), "unexpected error: {}", err);
    }

    #[test]
    fn test_firebase_url_scheme_checked() {
        let toml = r#"
            [source.firebase]
            url = "tank-default-rtdb.firebaseio.com"
        "#;
        let err = toml.parse::<Config>().unwrap_err().to_string();
        assert!(err.contains("http(s)"), "unexpected error: {}", err);
    }

    #[test]
    fn test_invalid_log_level() {
        let toml = r#"
            [logging]
            level = "loud"
            [source.memory]
        "#;
        assert!(matches!(
            toml.parse::<Config>(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aquamon.toml");
        std::fs::write(&path, "[source.memory]\nseed = \"seed.json\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        let memory = config.source.memory.unwrap();
        assert_eq!(memory.seed, Some(PathBuf::from("seed.json")));
    }

    #[test]
    fn test_missing_file_error() {
        let err = Config::from_file("/nonexistent/aquamon.toml")
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to read"), "Error should mention read failure");
        assert!(
            err.contains("/nonexistent/aquamon.toml"),
            "Error should include file path"
        );
    }

    #[test]
    fn test_log_level_to_level_filter() {
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::ERROR);

        let logging = LoggingConfig {
            level: LogLevel::Warn,
            overrides: HashMap::from([("aquamon::api".to_string(), LogLevel::Debug)]),
        };
        let targets = logging.targets();
        assert!(targets.would_enable("aquamon::api", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("aquamon::source", &tracing::Level::INFO));
        assert!(targets.would_enable("aquamon::source", &tracing::Level::WARN));
    }
}
