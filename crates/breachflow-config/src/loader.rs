//! Configuration loader with multi-source merging

use crate::error::{ConfigError, Result};
use crate::{BreachflowConfig, Paths};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    explicit_file: Option<PathBuf>,
    user_config: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "BREACHFLOW".to_string(),
            explicit_file: None,
            user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "BREACHFLOW")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Adds a file that must exist, layered above the local config.
    pub fn with_config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Skips `~/.config/breachflow/config.toml`.
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence, then validate.
    pub fn load(self) -> Result<BreachflowConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        builder = builder.add_source(config::Config::try_from(&BreachflowConfig::default())?);

        // 2. User config (~/.config/breachflow/config.toml)
        if self.user_config {
            if let Ok(user_config_file) = Paths::new().user_config_file() {
                if user_config_file.exists() {
                    builder = builder.add_source(toml_file(user_config_file));
                }
            }
        }

        // 3. Project config (breachflow.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(toml_file(project_config_file));
        }

        // 4. Local config (breachflow.local.toml)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(toml_file(local_config_file));
        }

        // 5. Explicit --config file
        if let Some(path) = self.explicit_file {
            std::fs::metadata(&path).map_err(|source| ConfigError::ReadError {
                path: path.clone(),
                source,
            })?;
            builder = builder.add_source(toml_file(path));
        }

        // 6. Environment variables (BREACHFLOW_WORKFLOW__FANOUT_WORKERS=8)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: BreachflowConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

fn toml_file(path: PathBuf) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .required(false)
        .format(config::FileFormat::Toml)
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFormat;
    use breachflow_types::NotificationMethod;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("BREACHFLOW_TEST_UNSET")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config.server.bind_address, "127.0.0.1:8088");
        assert_eq!(config.workflow.fanout_workers, 4);
        assert_eq!(config.workflow.dpb_contact_email, "dpb@meity.gov.in");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("breachflow.toml"),
            r#"
[server]
bind_address = "0.0.0.0:9000"

[workflow]
fanout_workers = 16
notification_method = "portal"

[logging]
level = "debug"
format = "json"
"#,
        )
        .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.workflow.fanout_workers, 16);
        assert_eq!(config.workflow.notification_method, NotificationMethod::Portal);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        // Untouched keys keep their defaults.
        assert_eq!(config.workflow.dpb_contact_name, "Data Protection Board of India");
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("breachflow.toml"),
            "[workflow]\ndpb_contact_email = \"board@example.gov\"\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("breachflow.local.toml"),
            "[workflow]\ndpb_contact_email = \"sandbox@example.test\"\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");
        assert_eq!(config.workflow.dpb_contact_email, "sandbox@example.test");
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let err = loader(temp_dir.path())
            .with_config_file(temp_dir.path().join("missing.toml"))
            .load()
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn test_zero_workers_fails_validation() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join("breachflow.toml"),
            "[workflow]\nfanout_workers = 0\n",
        )
        .expect("Failed to write config");

        let err = loader(temp_dir.path()).load().expect_err("invalid");
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    // Environment overrides are not exercised here: mutating the process
    // environment needs `unsafe` on edition 2024. In use:
    //
    // BREACHFLOW_SERVER__BIND_ADDRESS=0.0.0.0:8080
    // BREACHFLOW_WORKFLOW__FANOUT_WORKERS=8
}
