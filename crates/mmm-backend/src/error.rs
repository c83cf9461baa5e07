//! Error types for model backends.

use std::backtrace::Backtrace;
use std::fmt;

/// Error type for model fitting.
///
/// Every variant is an external-model failure from the pipeline's point of
/// view: the input was valid but no usable posterior came back.
#[derive(Debug)]
pub struct BackendError {
    kind: BackendErrorKind,
    backtrace: Backtrace,
}

/// Internal error variants. Not exposed publicly; use `is_xxx()` methods.
#[derive(Debug)]
pub(crate) enum BackendErrorKind {
    /// The external program could not be started.
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// Talking to the external program over its pipes failed.
    Io(std::io::Error),
    /// The external program exited unsuccessfully.
    Exited { status: String, stderr_tail: String },
    /// The external program's output is not a posterior document.
    InvalidOutput(serde_json::Error),
    /// The fit itself broke down (singular system, no variation).
    Numerical(String),
    /// The backend cannot handle this configuration.
    Unsupported(String),
}

impl BackendError {
    /// Creates an error from an error kind, capturing a backtrace.
    pub(crate) fn new(kind: BackendErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    pub(crate) fn numerical(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Numerical(detail.into()))
    }

    pub(crate) fn unsupported(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unsupported(detail.into()))
    }

    /// Returns true if the external program could not be started.
    pub fn is_spawn(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Spawn { .. })
    }

    /// Returns true if pipe I/O with the external program failed.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Io(_))
    }

    /// Returns true if the external program exited unsuccessfully.
    pub fn is_exited(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Exited { .. })
    }

    /// Returns true if the backend returned unparseable output.
    pub fn is_invalid_output(&self) -> bool {
        matches!(self.kind, BackendErrorKind::InvalidOutput(_))
    }

    /// Returns true if the fit broke down numerically.
    pub fn is_numerical(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Numerical(_))
    }

    /// Returns true if the backend does not support the request.
    pub fn is_unsupported(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Unsupported(_))
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::Spawn { program, source } => {
                write!(f, "failed to start model backend '{program}': {source}")
            }
            BackendErrorKind::Io(err) => {
                write!(f, "failed to communicate with model backend: {err}")
            }
            BackendErrorKind::Exited {
                status,
                stderr_tail,
            } => {
                write!(f, "model backend exited with {status}")?;
                if !stderr_tail.is_empty() {
                    write!(f, ": {stderr_tail}")?;
                }
                Ok(())
            }
            BackendErrorKind::InvalidOutput(err) => {
                write!(f, "model backend returned invalid output: {err}")
            }
            BackendErrorKind::Numerical(detail) => {
                write!(f, "model fit failed: {detail}")
            }
            BackendErrorKind::Unsupported(detail) => {
                write!(f, "unsupported backend configuration: {detail}")
            }
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            BackendErrorKind::Spawn { source, .. } => Some(source),
            BackendErrorKind::Io(err) => Some(err),
            BackendErrorKind::InvalidOutput(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        Self::new(BackendErrorKind::Io(err))
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(BackendErrorKind::InvalidOutput(err))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_exited_includes_stderr() {
        let err = BackendError::new(BackendErrorKind::Exited {
            status: "exit status: 2".into(),
            stderr_tail: "ImportError: No module named meridian".into(),
        });
        assert!(err.is_exited());
        assert!(err.to_string().contains("ImportError"));
        assert!(err.source().is_none());
    }

    #[test]
    fn test_invalid_output_classified() {
        let json_err = serde_json::from_str::<u32>("{").unwrap_err();
        let err = BackendError::from(json_err);
        assert!(err.is_invalid_output());
        assert!(!err.is_numerical());
        assert!(err.source().is_some());
    }
}
