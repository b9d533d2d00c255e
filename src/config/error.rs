//! Errors from loading, validating and printing the TOML configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons the merged configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read, or `--config` names a
    /// missing file.
    #[error("Cannot read config file {path}: {source}")]
    ReadError {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A config file is not valid TOML or does not match the schema.
    #[error("Invalid TOML in config file {path}: {source}")]
    ParseError {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A merged setting fails validation, e.g. a socket path too long for
    /// `sun_path` or a timeout shorter than the poll interval.
    #[error("Invalid setting {field}: {message}")]
    InvalidValue {
        /// Dotted setting name, such as `server.socket_path`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The effective configuration could not be rendered for `config`.
    #[error("Cannot render config as TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_names_setting() {
        let err = ConfigError::InvalidValue {
            field: "automation.confirm_timeout_ms".to_string(),
            message: "10ms is shorter than the poll interval 50ms".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid setting automation.confirm_timeout_ms: 10ms is shorter than the poll interval 50ms"
        );
    }
}
