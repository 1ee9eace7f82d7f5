//! Configuration management for the consultation report service.
//!
//! Settings are layered with figment: built-in defaults, then a TOML file, then environment
//! variables prefixed with `CONSULTATION_REPORT_` (nested keys separated by `__`, for example
//! `CONSULTATION_REPORT_SERVER__BIND_ADDR`).

use std::net::SocketAddr;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::form::{FormLimits, DEFAULT_LOGO_TYPES, DEFAULT_MAX_LOGO_BYTES};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name used under the platform config and data directories.
const APP_DIR_NAME: &str = "consultation-report";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "reports.db";

/// Default media directory name.
const MEDIA_DIR_NAME: &str = "media";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "CONSULTATION_REPORT_";

/// Default request body limit: 10 MiB.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Database and media locations.
    pub storage: StorageConfig,
    /// Form validation limits.
    pub form: FormConfig,
    /// PDF rendering options.
    pub report: ReportConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the server listens on.
    pub bind_addr: SocketAddr,
    /// Largest accepted request body.
    pub max_body_bytes: u64,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `<data dir>/consultation-report/reports.db`
    pub database_path: Option<PathBuf>,
    /// Directory that holds uploaded logos.
    /// Defaults to `<data dir>/consultation-report/media`
    pub media_root: Option<PathBuf>,
}

/// Form validation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Largest accepted logo upload.
    pub max_logo_bytes: u64,
    /// Accepted logo content types.
    pub allowed_logo_types: Vec<String>,
}

/// PDF rendering configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Extra directory searched for the report fonts.
    pub fonts_dir: Option<PathBuf>,
    /// Add a PDF outline (needs the `bookmarks` feature).
    pub bookmarks: bool,
    /// Hyphenate body text (needs the `hyphenation` feature).
    pub hyphenate: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            max_logo_bytes: DEFAULT_MAX_LOGO_BYTES,
            allowed_logo_types: DEFAULT_LOGO_TYPES.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

impl Config {
    /// Load configuration from the default file location and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// A missing file is not an error; defaults and environment variables still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(APP_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_body_bytes == 0 {
            return Err(Error::ConfigValidation {
                message: "server.max_body_bytes must be greater than 0".to_string(),
            });
        }

        if self.form.max_logo_bytes == 0 {
            return Err(Error::ConfigValidation {
                message: "form.max_logo_bytes must be greater than 0".to_string(),
            });
        }

        if self.server.max_body_bytes < self.form.max_logo_bytes {
            return Err(Error::ConfigValidation {
                message: format!(
                    "server.max_body_bytes ({}) cannot be smaller than form.max_logo_bytes ({})",
                    self.server.max_body_bytes, self.form.max_logo_bytes
                ),
            });
        }

        if self.form.allowed_logo_types.is_empty() {
            return Err(Error::ConfigValidation {
                message: "form.allowed_logo_types must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the media root, resolving defaults if not set.
    #[must_use]
    pub fn media_root(&self) -> PathBuf {
        self.storage
            .media_root
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(MEDIA_DIR_NAME))
    }

    /// Form limits derived from the `form` section.
    #[must_use]
    pub fn form_limits(&self) -> FormLimits {
        FormLimits {
            max_logo_bytes: self.form.max_logo_bytes,
            allowed_logo_types: self.form.allowed_logo_types.clone(),
        }
    }

    /// Request body limit as a `usize`, saturating on narrow platforms.
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        usize::try_from(self.server.max_body_bytes).unwrap_or(usize::MAX)
    }
}
