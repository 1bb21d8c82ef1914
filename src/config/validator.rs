use crate::config::Config;
use crate::error::{Result, TracebomError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, accumulating every problem before
    /// failing.
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_paths(config, &mut errors);
        Self::validate_tracer(config, &mut errors);
        Self::validate_matching(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TracebomError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_paths(config: &Config, errors: &mut Vec<ValidationError>) {
        // Note: file existence is not checked here because:
        // 1. Paths may contain ~ which needs expansion
        // 2. Files may not exist yet (created by `tracebom config init`
        //    or by a trace run)

        if config.paths.rules_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "paths.rules_file",
                "Rules file path cannot be empty",
            ));
        }

        if config.paths.output_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "paths.output_file",
                "Output file path cannot be empty",
            ));
        }

        if config.paths.log_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "paths.log_file",
                "Log file path cannot be empty",
            ));
        }
    }

    fn validate_tracer(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.tracer.binary.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "tracer.binary",
                "Tracer binary path cannot be empty",
            ));
        }

        if config.tracer.script.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "tracer.script",
                "Probe script path cannot be empty",
            ));
        }
    }

    fn validate_matching(config: &Config, errors: &mut Vec<ValidationError>) {
        let threshold = config.matching.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "matching.threshold",
                format!("Threshold must be between 0.0 and 1.0, got {}", threshold),
            ));
        }
    }
}
