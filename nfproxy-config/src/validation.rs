//! Custom validation functions for configuration.

use validator::ValidationError;

/// Validate that a protocol name is a lowercase identifier.
pub fn validate_protocol(name: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^[a-z][a-z0-9_]*$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_protocol"))
    }
}

/// Validate a tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_names() {
        assert!(validate_protocol("tcp").is_ok());
        assert!(validate_protocol("http2").is_ok());
        assert!(validate_protocol("HTTP").is_err());
        assert!(validate_protocol("").is_err());
    }

    #[test]
    fn log_levels() {
        assert!(validate_log_level("INFO").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }
}
