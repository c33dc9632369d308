// Configuration loading and parsing (console.toml, credentials.toml).

use chrono::format::{Item, StrftimeItems};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    /// Session database path, resolved to the platform data directory when
    /// console.toml leaves it unset.
    pub session_path: PathBuf,
    pub display: DisplayConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// console.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire console.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ConsoleFile {
    store: StoreConfig,
    #[serde(default)]
    session: SessionSection,
    #[serde(default)]
    display: DisplayConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Rest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: Backend,
    #[serde(default)]
    pub sqlite_path: String,
    #[serde(default)]
    pub rest_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SessionSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            time_format: default_time_format(),
        }
    }
}

fn default_date_format() -> String {
    touchline_core::format::DEFAULT_DATE_FORMAT.to_string()
}

fn default_time_format() -> String {
    touchline_core::format::DEFAULT_TIME_FORMAT.to_string()
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Anonymous key of the hosted store.
    pub api_key: Option<String>,
    /// Access token of a signed-in user (rest backend).
    pub access_token: Option<String>,
    /// Static identity (sqlite backend).
    pub user_id: Option<String>,
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/console.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let console: ConsoleFile = parse_file(&config_dir.join("console.toml"))?;

    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        parse_file(&credentials_path)?
    } else {
        CredentialsConfig::default()
    };

    let session_path = match console.session.path {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => default_session_path(),
    };

    let config = Config {
        store: console.store,
        session_path,
        display: console.display,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Files seeded from `defaults/` into `config/` on first run. Credentials
/// only ship as an `.example` and are never seeded.
const SEEDED_FILES: &[&str] = &["console.toml"];

/// Copy any seeded file missing from `config/` out of `defaults/`, returning
/// the paths written. Existing files are left alone.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.is_dir() {
            return Ok(vec![]);
        }
        return Err(ConfigError::DefaultsCopyError {
            message: format!("no defaults/ or config/ directory in {}", base_dir.display()),
        });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create {}: {e}", config_dir.display()),
    })?;

    let mut copied = Vec::new();
    for name in SEEDED_FILES {
        let (source, target) = (defaults_dir.join(name), config_dir.join(name));
        if target.exists() || !source.is_file() {
            continue;
        }
        std::fs::copy(&source, &target).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to copy {}: {e}", source.display()),
        })?;
        copied.push(target);
    }
    Ok(copied)
}

/// Loads config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

fn default_session_path() -> PathBuf {
    match ProjectDirs::from("", "", "touchline") {
        Some(dirs) => dirs.data_local_dir().join("session.db"),
        None => PathBuf::from("touchline-session.db"),
    }
}

fn strftime_error(pattern: &str) -> bool {
    StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let store = &config.store;
    match store.backend {
        Backend::Sqlite => {
            if store.sqlite_path.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    field: "store.sqlite_path".into(),
                    message: "must not be empty for the sqlite backend".into(),
                });
            }
        }
        Backend::Rest => {
            if store.rest_url.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    field: "store.rest_url".into(),
                    message: "must not be empty for the rest backend".into(),
                });
            }
            if !store.rest_url.starts_with("http://") && !store.rest_url.starts_with("https://") {
                return Err(ConfigError::ValidationError {
                    field: "store.rest_url".into(),
                    message: format!("must be an http(s) URL, got {}", store.rest_url),
                });
            }
            if config
                .credentials
                .api_key
                .as_deref()
                .map_or(true, |k| k.trim().is_empty())
            {
                return Err(ConfigError::ValidationError {
                    field: "credentials.api_key".into(),
                    message: "required for the rest backend".into(),
                });
            }
        }
    }

    let formats = [
        ("display.date_format", &config.display.date_format),
        ("display.time_format", &config.display.time_format),
    ];
    for (name, pattern) in formats {
        if pattern.is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
        if strftime_error(pattern) {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: format!("invalid strftime pattern: {pattern}"),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
