//! Error types for logdrop

use std::path::PathBuf;

/// logdrop error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid timestamp (expected YYYYMMDD-HHMMSS.uuuuuu): {0}")]
    InvalidTimestamp(String),

    #[error("Invalid level (expected two digits): {0}")]
    InvalidLevel(String),

    #[error("Invalid facility (expected alphanumeric or underscore): {0}")]
    InvalidFacility(String),

    #[error("Invalid day (expected YYYYMMDD): {0}")]
    InvalidDay(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid cache entry name: {0}")]
    InvalidEntryName(String),

    #[error("Invalid log file name: {0}")]
    InvalidLogName(String),

    #[error("Invalid record line: {0}")]
    InvalidLine(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Directory unreachable: {path}: {source}")]
    Unreachable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Form decode error: {0}")]
    FormDecodeError(#[from] serde_urlencoded::de::Error),

    #[error("Form encode error: {0}")]
    FormEncodeError(#[from] serde_urlencoded::ser::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for logdrop
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn query<S: Into<String>>(msg: S) -> Self {
        Error::InvalidQuery(msg.into())
    }

    pub fn unreachable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Unreachable {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was caused by the producer's input rather than by the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidTimestamp(_)
                | Error::InvalidLevel(_)
                | Error::InvalidFacility(_)
                | Error::MissingField(_)
                | Error::FormDecodeError(_)
                | Error::InvalidQuery(_)
                | Error::InvalidDay(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidLevel("4".to_string());
        assert_eq!(err.to_string(), "Invalid level (expected two digits): 4");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::MissingField("level".into()).is_client_error());
        assert!(Error::InvalidTimestamp("x".into()).is_client_error());
        assert!(!Error::config("bad").is_client_error());
    }
}
