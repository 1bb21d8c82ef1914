//! Configuration management for tracebom
//!
//! Loads the TOML configuration, applies `TRACEBOM_SECTION__KEY`
//! environment overrides, and validates the result before anything else
//! runs.

use crate::error::{Result, TracebomError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub paths: PathsConfig,
    pub tracer: TracerConfig,
    pub matching: MatchingConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub rules_file: PathBuf,
    pub output_file: PathBuf,
    pub log_file: PathBuf,
}

/// External tracer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerConfig {
    pub binary: PathBuf,
    pub script: PathBuf,
    pub use_sudo: bool,
}

/// Inventory matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub threshold: f64,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TracebomError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TracebomError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TracebomError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TRACEBOM_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("TRACEBOM_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "PATHS__RULES_FILE" => {
                self.paths.rules_file = PathBuf::from(value);
            }
            "PATHS__OUTPUT_FILE" => {
                self.paths.output_file = PathBuf::from(value);
            }
            "PATHS__LOG_FILE" => {
                self.paths.log_file = PathBuf::from(value);
            }
            "TRACER__BINARY" => {
                self.tracer.binary = PathBuf::from(value);
            }
            "TRACER__SCRIPT" => {
                self.tracer.script = PathBuf::from(value);
            }
            "TRACER__USE_SUDO" => {
                self.tracer.use_sudo =
                    value.parse().map_err(|_| TracebomError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as boolean", value),
                    })?;
            }
            "MATCHING__THRESHOLD" => {
                self.matching.threshold =
                    value.parse().map_err(|_| TracebomError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as number", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the directory holding the config file, rules and probe script
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| TracebomError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("tracebom"))
    }
}

/// Expand a leading `~` to the user's home directory. Paths without a
/// tilde pass through untouched.
pub fn expand_path(path: &Path) -> PathBuf {
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = text.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if text == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    path.to_path_buf()
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = PathBuf::from("~/.config/tracebom");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            paths: PathsConfig {
                rules_file: config_dir.join("rules.yaml"),
                output_file: PathBuf::from("./cbom.json"),
                log_file: PathBuf::from("/tmp/tracebom/trace.log"),
            },
            tracer: TracerConfig {
                binary: PathBuf::from("/usr/bin/bpftrace"),
                script: config_dir.join("probes.bt"),
                use_sudo: true,
            },
            matching: MatchingConfig {
                threshold: crate::matching::DEFAULT_THRESHOLD,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.meta.schema_version, "1.0.0");
        assert_eq!(parsed.matching.threshold, config.matching.threshold);
        assert_eq!(parsed.tracer.binary, config.tracer.binary);
    }

    #[test]
    fn test_env_override_updates_threshold() {
        let mut config = Config::default();
        config
            .set_value_from_env("MATCHING__THRESHOLD", "0.8")
            .unwrap();
        assert_eq!(config.matching.threshold, 0.8);
    }

    #[test]
    fn test_env_override_rejects_bad_boolean() {
        let mut config = Config::default();
        assert!(config
            .set_value_from_env("TRACER__USE_SUDO", "definitely")
            .is_err());
    }

    #[test]
    fn test_env_override_ignores_unknown_key() {
        let mut config = Config::default();
        assert!(config.set_value_from_env("NOT__A_KEY", "x").is_ok());
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let err = Config::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, TracebomError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_expand_path_handles_tilde() {
        let expanded = expand_path(Path::new("~/x/rules.yaml"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("x/rules.yaml"));

        let plain = expand_path(Path::new("/tmp/trace.log"));
        assert_eq!(plain, PathBuf::from("/tmp/trace.log"));
    }
}
