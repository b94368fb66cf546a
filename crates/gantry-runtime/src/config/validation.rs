//! Configuration validation utilities.

use http::{HeaderName, HeaderValue};

use super::error::{ConfigError, ConfigResult};
use super::schema::{GantryConfig, LogOutput, LoggingConfig, ResponseConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &GantryConfig) -> ConfigResult<()> {
    if config.app.name.trim().is_empty() {
        return Err(ConfigError::missing_field("app.name"));
    }
    validate_logging_config(&config.logging)?;
    validate_response_config(&config.response)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    Ok(())
}

/// Response headers must be representable on the wire, cookies need a key.
fn validate_response_config(response: &ResponseConfig) -> ConfigResult<()> {
    for (name, value) in &response.headers {
        HeaderName::try_from(name.as_str())
            .map_err(|e| ConfigError::invalid_header(name, e.to_string()))?;
        HeaderValue::try_from(value.as_str())
            .map_err(|e| ConfigError::invalid_header(name, e.to_string()))?;
    }

    if response.cookies.iter().any(|c| c.key.is_empty()) {
        return Err(ConfigError::missing_field("response.cookies[].key"));
    }

    Ok(())
}
