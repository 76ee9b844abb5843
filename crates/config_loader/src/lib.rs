//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML / JSON / `.properties` configuration files
//! - Overlay `HIVE_*` environment knobs onto the sink tunables
//! - Validate configuration legality
//! - Produce `ExportConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("export.toml")).unwrap();
//! println!("Target: {}.{}", config.hive.db, config.hive.table);
//! ```

pub mod env;
mod parser;
mod validator;

pub use contracts::ExportConfig;
pub use env::{apply_env_overrides, sink_settings_from_env};
pub use parser::{parse_partition_columns, ConfigFormat};
pub use validator::warnings;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension
    /// (.toml / .json / .properties).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Invalid environment override
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<ExportConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string, applying the process environment
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<ExportConfig, ContractError> {
        Self::load_from_str_with(content, format, |key| std::env::var(key).ok())
    }

    /// Load configuration from string with environment values from `lookup`
    pub fn load_from_str_with<F>(
        content: &str,
        format: ConfigFormat,
        lookup: F,
    ) -> Result<ExportConfig, ContractError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = parser::parse(content, format)?;
        env::apply_overrides_from(&mut config.sink, lookup)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Validate an already-built configuration
    pub fn validate(config: &ExportConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize ExportConfig to TOML string
    pub fn to_toml(config: &ExportConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize ExportConfig to JSON string
    pub fn to_json(config: &ExportConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
