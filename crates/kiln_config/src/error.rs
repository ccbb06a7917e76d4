//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating a `kiln.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// An environment override held a value that could not be interpreted.
    #[error("invalid value '{value}' for environment variable {var}")]
    InvalidEnv {
        /// The environment variable name.
        var: String,
        /// The rejected value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_error() {
        let err = ConfigError::ParseError("expected '=' at line 3".to_string());
        assert_eq!(
            format!("{err}"),
            "failed to parse configuration: expected '=' at line 3"
        );
    }

    #[test]
    fn display_validation_error() {
        let err = ConfigError::ValidationError("memory.max_entries must be non-zero".to_string());
        assert_eq!(
            format!("{err}"),
            "validation error: memory.max_entries must be non-zero"
        );
    }

    #[test]
    fn display_invalid_env() {
        let err = ConfigError::InvalidEnv {
            var: "KILN_CACHE_MAX_ENTRIES".to_string(),
            value: "lots".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "invalid value 'lots' for environment variable KILN_CACHE_MAX_ENTRIES"
        );
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::from(io_err);
        assert!(format!("{err}").starts_with("failed to read configuration"));
    }
}
