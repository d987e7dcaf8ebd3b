//! Configuration Loader
//!
//! Reads `delivery.toml` through the `config` crate and layers
//! `DELIVERY__SECTION__KEY` environment variables on top of it.

use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::DeliveryConfig;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "DELIVERY_CONFIG_PATH";

const DEFAULT_CONFIG_PATH: &str = "config/delivery.toml";
const ENV_PREFIX: &str = "DELIVERY";
const ENV_SEPARATOR: &str = "__";

pub struct ConfigManager {
    config: DeliveryConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load from `DELIVERY_CONFIG_PATH`, falling back to `config/delivery.toml`
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let path = env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific file
    pub fn load_from_path(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }

        debug!(path = %path.display(), "Loading delivery configuration");

        let config: DeliveryConfig = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| ConfigurationError::invalid_format(path.display().to_string(), e))?;

        config.validate()?;

        let manager = ConfigManager {
            config,
            config_path: path.to_path_buf(),
        };

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string_pretty(&manager.sanitized())
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            path = %path.display(),
            record_metadata = manager.config.delivery.record_metadata,
            hard_stage_only = manager.config.transfer.hard_stage_only,
            "⚙️ CONFIG: Delivery configuration loaded"
        );

        Ok(Arc::new(manager))
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Configuration as JSON with secrets masked, safe to log
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self.config);
        sanitize_json_recursive(&mut value, &["password", "secret", "token"]);
        value
    }
}

fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let is_sensitive = sensitive_patterns
                    .iter()
                    .any(|pattern| key_lower.contains(pattern));

                if is_sensitive {
                    *val = match val {
                        serde_json::Value::String(s) if s.is_empty() => {
                            serde_json::Value::String("[EMPTY]".to_string())
                        }
                        _ => serde_json::Value::String("[MASKED]".to_string()),
                    };
                } else {
                    sanitize_json_recursive(val, sensitive_patterns);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                sanitize_json_recursive(item, sensitive_patterns);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_CONFIG: &str = r#"
[paths]
soft_stage = "/proj/stage/_PROJECTID_"
hard_stage = "/proj/delivery_hard/_PROJECTID_"
run_folder_data = "/proj/archives/_FCID_"

[transfer]
hard_stage_only = true

[monitor]
poll_interval_secs = 60
max_delivery_hours = 48

[ticket]
api_url = "https://tickets.example.org/api"
api_user = "deliver"
api_password = "hunter22"

[metadata_store]
base_url = "https://metadata.example.org"
api_token = "abcdef"

[summary_store]
base_url = "https://summary.example.org"
username = "reader"
password = "pw"

[delivery]
record_metadata = true
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_path() {
        let file = write_config(TEST_CONFIG);
        let manager = ConfigManager::load_from_path(file.path()).unwrap();
        let config = manager.config();

        assert!(config.transfer.hard_stage_only);
        assert_eq!(config.monitor.poll_interval_secs, 60);
        assert_eq!(config.monitor.max_delivery_hours, Some(48));
        assert!(config.delivery.record_metadata);
        assert!(config.summary_store.is_some());
        assert!(config.order_portal.is_none());
        assert_eq!(manager.config_path(), file.path());
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigManager::load_from_path(Path::new("/nonexistent/delivery.toml"));
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_ceiling_is_rejected_at_load() {
        let file = write_config(&TEST_CONFIG.replace("max_delivery_hours = 48", ""));
        let result = ConfigManager::load_from_path(file.path());
        assert!(matches!(
            result,
            Err(ConfigurationError::MissingRequiredField { ref field, .. }) if field == "max_delivery_hours"
        ));
    }

    #[test]
    fn test_malformed_file() {
        let file = write_config("[paths\nsoft_stage = ");
        let result = ConfigManager::load_from_path(file.path());
        assert!(matches!(result, Err(ConfigurationError::InvalidFormat { .. })));
    }

    #[test]
    fn test_sanitized_masks_secrets() {
        let file = write_config(TEST_CONFIG);
        let manager = ConfigManager::load_from_path(file.path()).unwrap();
        let sanitized = manager.sanitized();

        assert_eq!(sanitized["ticket"]["api_password"], "[MASKED]");
        assert_eq!(sanitized["metadata_store"]["api_token"], "[MASKED]");
        assert_eq!(sanitized["summary_store"]["password"], "[MASKED]");
        assert_eq!(sanitized["ticket"]["api_user"], "deliver");
        assert_eq!(sanitized["monitor"]["max_delivery_hours"], 48);
    }
}
