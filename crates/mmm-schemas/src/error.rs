//! Error type for loading and validating run configurations.

use std::backtrace::Backtrace;
use std::fmt;

/// Error type for run configuration loading.
///
/// Uses the canonical struct pattern: a private kind enum, a captured
/// backtrace, and `is_xxx()` helpers for classification.
#[derive(Debug)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    backtrace: Backtrace,
}

/// Internal error variants. Not exposed publicly; use `is_xxx()` methods.
#[derive(Debug)]
pub(crate) enum ConfigErrorKind {
    /// The configuration file could not be read.
    Io(std::io::Error),
    /// The configuration is not valid JSON or has mistyped keys.
    Deserialization(serde_json::Error),
    /// The configuration parsed but violates a constraint.
    Invalid(String),
}

impl ConfigError {
    /// Creates an error from an error kind, capturing a backtrace.
    pub(crate) fn new(kind: ConfigErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Invalid(message.into()))
    }

    /// Returns true if the configuration file could not be read.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::Io(_))
    }

    /// Returns true if the configuration could not be deserialized.
    pub fn is_deserialization(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::Deserialization(_))
    }

    /// Returns true if the configuration violates a value constraint.
    pub fn is_invalid(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::Invalid(_))
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorKind::Io(err) => {
                write!(f, "failed to read configuration: {err}")
            }
            ConfigErrorKind::Deserialization(err) => {
                write!(f, "failed to parse configuration: {err}")
            }
            ConfigErrorKind::Invalid(message) => {
                write!(f, "invalid configuration: {message}")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ConfigErrorKind::Io(err) => Some(err),
            ConfigErrorKind::Deserialization(err) => Some(err),
            ConfigErrorKind::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ConfigErrorKind::Io(err))
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ConfigErrorKind::Deserialization(err))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_deserialization_classified() {
        let json_err =
            serde_json::from_str::<String>("not valid json").unwrap_err();
        let err = ConfigError::from(json_err);

        assert!(err.is_deserialization());
        assert!(!err.is_io());
        assert!(!err.is_invalid());
        assert!(err.to_string().contains("failed to parse configuration"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_has_no_source() {
        let err = ConfigError::invalid("seasonality must be at least 1");

        assert!(err.is_invalid());
        assert!(err.to_string().contains("seasonality"));
        assert!(err.source().is_none());
        let _ = err.backtrace();
    }
}
