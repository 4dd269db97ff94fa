//! Configuration management.
//!
//! The core operations take all of their parameters explicitly; this module
//! is a convenience for embedding callers that want file/env-driven
//! settings layered over defaults.

use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source export settings
    pub source: SourceConfig,
    /// Ingestion engine settings
    pub ingestion: IngestionConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Source export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path of the messaging-app export database
    pub database_path: String,
    /// Directory for the prepared store
    pub base_dir: String,
}

/// Ingestion engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Message rows per batch
    pub batch_size: usize,
    /// Handle rows per batch
    pub contact_batch_size: usize,
    /// Drop derived data and re-ingest from scratch
    pub force_rebuild: bool,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace" .. "error")
    pub level: String,
    /// Optional log file path
    pub file_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                database_path: "chat.db".to_string(),
                base_dir: "./data".to_string(),
            },
            ingestion: IngestionConfig {
                batch_size: 5000,
                contact_batch_size: 1000,
                force_rebuild: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, optional config files, and
    /// `CHATTRACKS_*` environment variables, in that precedence order.
    pub fn load() -> Result<Self> {
        let defaults = AppConfig::default();
        let config = Config::builder()
            .set_default("source.database_path", defaults.source.database_path)?
            .set_default("source.base_dir", defaults.source.base_dir)?
            .set_default("ingestion.batch_size", defaults.ingestion.batch_size as i64)?
            .set_default(
                "ingestion.contact_batch_size",
                defaults.ingestion.contact_batch_size as i64,
            )?
            .set_default("ingestion.force_rebuild", defaults.ingestion.force_rebuild)?
            .set_default("logging.level", defaults.logging.level)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("CHATTRACKS").separator("__"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.ingestion.batch_size == 0 {
            return Err(anyhow::anyhow!("batch_size must be greater than 0"));
        }
        if self.ingestion.contact_batch_size == 0 {
            return Err(anyhow::anyhow!(
                "contact_batch_size must be greater than 0"
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        if self.source.base_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("base_dir cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.ingestion.batch_size, 5000);
        assert_eq!(config.logging.level, "info");
        assert!(!config.ingestion.force_rebuild);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.ingestion.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
