use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the tracebom application
#[derive(Error, Debug)]
pub enum TracebomError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Correlation invariant violations; these abort the pipeline run
    #[error("Correlation error in stage '{stage}': {message}")]
    Correlation { stage: String, message: String },

    /// Rule configuration errors (bad predicate, missing required field)
    #[error("Rule configuration error: {0}")]
    RuleConfig(String),

    /// Tracer subprocess errors
    #[error("Tracer error: {0}")]
    Tracer(String),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// YAML errors (rule documents)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for tracebom operations
pub type Result<T> = std::result::Result<T, TracebomError>;
