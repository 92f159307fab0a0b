//! Configuration management for breachflow
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (`BREACHFLOW_*`, `__` between section and key)
//! 3. An explicit `--config` file
//! 4. breachflow.local.toml (gitignored, local overrides)
//! 5. breachflow.toml (git-tracked, project config)
//! 6. ~/.config/breachflow/config.toml (user defaults)
//! 7. Built-in defaults (lowest precedence)

use breachflow_types::NotificationMethod;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main breachflow configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreachflowConfig {
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8088".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub dpb_contact_name: String,
    pub dpb_contact_email: String,
    /// Threads used to send data-principal notices.
    pub fanout_workers: usize,
    /// Channel for the regulator notice.
    pub notification_method: NotificationMethod,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            dpb_contact_name: "Data Protection Board of India".to_string(),
            dpb_contact_email: "dpb@meity.gov.in".to_string(),
            fanout_workers: 4,
            notification_method: NotificationMethod::Email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl BreachflowConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "server.bind_address {:?} is not a socket address: {e}",
                    self.server.bind_address
                ))
            })?;

        if self.workflow.fanout_workers == 0 {
            return Err(ConfigError::ValidationError(
                "workflow.fanout_workers must be at least 1".to_string(),
            ));
        }

        let email = self.workflow.dpb_contact_email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ConfigError::ValidationError(format!(
                "workflow.dpb_contact_email {email:?} is not an email address"
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {LOG_LEVELS:?}, got {:?}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Renders the resolved configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BreachflowConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.server.bind_address, "127.0.0.1:8088");
        assert_eq!(config.workflow.notification_method, NotificationMethod::Email);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_dpb_email_is_rejected() {
        let mut config = BreachflowConfig::default();
        config.workflow.dpb_contact_email = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let mut config = BreachflowConfig::default();
        config.server.bind_address = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let mut config = BreachflowConfig::default();
        config.logging.level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_rendering_round_trips() {
        let config = BreachflowConfig::default();
        let rendered = config.to_toml().expect("render");
        assert!(rendered.contains("[workflow]"));
        assert!(rendered.contains("fanout_workers = 4"));

        let parsed: BreachflowConfig = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed, config);
    }
}
