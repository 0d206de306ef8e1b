//! Configuration management
//!
//! Unified TOML configuration with zero-config defaults: every component
//! config embeds its own defaults, so a missing file or missing section
//! still yields a runnable setup. Durations are written in human-readable
//! form ("30s", "10m").

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::checker::CheckerConfig;
use crate::app::client::ClientConfig;
use crate::app::generator::GeneratorConfig;
use crate::app::manager::ManagerConfig;
use crate::app::source::SourceConfig;
use crate::constants::{logging, pages};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listing-page HTTP client settings
    #[serde(default)]
    pub client: ClientConfig,
    /// Validation checker settings
    #[serde(default)]
    pub checker: CheckerConfig,
    /// Content generator settings
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Aggregator settings
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Paginated proxy-list sources to harvest
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            checker: CheckerConfig::default(),
            generator: GeneratorConfig::default(),
            manager: ManagerConfig::default(),
            sources: default_sources(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Example sources shipped with the zero-config defaults
fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "proxy-list-example".to_string(),
            url_template: "https://proxy-list.example/list/{PAGENO}.html".to_string(),
            start_page: pages::START_PAGE,
            pad: Default::default(),
            cooldown: pages::DEFAULT_COOLDOWN,
            protocol: Default::default(),
            valid_marker: Some("proxylist".to_string()),
            row_selector: Some("table.proxylist tbody tr".to_string()),
        },
        SourceConfig {
            name: "plain-list-example".to_string(),
            url_template: "https://proxylisting.example/raw?page={PAGENO}".to_string(),
            start_page: pages::START_PAGE,
            pad: Default::default(),
            cooldown: pages::DEFAULT_COOLDOWN,
            protocol: Default::default(),
            valid_marker: None,
            row_selector: None,
        },
    ]
}

impl AppConfig {
    /// Load configuration from the given TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the file does not exist and
    /// `ConfigError::InvalidFormat` if it does not parse.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from an explicit path, the default location, or fall back to
    /// built-in defaults when no file exists
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::load(&default),
                _ => {
                    debug!("no configuration file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Write the configuration to the given path, creating parent
    /// directories as needed
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("proxy_harvester").join("config.toml"))
    }

    /// Validate the full configuration
    pub fn validate(&self) -> ConfigResult<()> {
        self.client
            .validate()
            .map_err(|reason| ConfigError::InvalidValue {
                field: "client".to_string(),
                reason,
            })?;
        self.checker
            .validate()
            .map_err(|reason| ConfigError::InvalidValue {
                field: "checker".to_string(),
                reason,
            })?;

        if self.sources.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sources".to_string(),
                reason: "at least one source is required".to_string(),
            });
        }
        for source in &self.sources {
            if !source.url_template.contains(pages::PLACEHOLDER) {
                return Err(ConfigError::InvalidValue {
                    field: format!("sources.{}", source.name),
                    reason: format!("url_template is missing {}", pages::PLACEHOLDER),
                });
            }
        }
        Ok(())
    }
}
