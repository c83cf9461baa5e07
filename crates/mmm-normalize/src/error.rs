//! Error types for result normalization.

use std::backtrace::Backtrace;
use std::fmt;

/// Error type for result normalization.
///
/// Missing quantities are never errors; they fall back to flagged
/// defaults. Only output that is present but unusable fails.
#[derive(Debug)]
pub struct NormalizeError {
    kind: NormalizeErrorKind,
    backtrace: Backtrace,
}

/// Internal error variants. Not exposed publicly; use `is_xxx()` methods.
#[derive(Debug)]
pub(crate) enum NormalizeErrorKind {
    /// A tensor's channel axis does not match the channel list.
    Shape { quantity: String, detail: String },
    /// A reduced value is NaN or infinite.
    NonFinite { quantity: String, channel: String },
}

impl NormalizeError {
    /// Creates an error from an error kind, capturing a backtrace.
    pub(crate) fn new(kind: NormalizeErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    pub(crate) fn shape(
        quantity: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(NormalizeErrorKind::Shape {
            quantity: quantity.into(),
            detail: detail.into(),
        })
    }

    pub(crate) fn non_finite(
        quantity: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self::new(NormalizeErrorKind::NonFinite {
            quantity: quantity.into(),
            channel: channel.into(),
        })
    }

    /// Returns true if a posterior tensor had the wrong shape.
    pub fn is_shape(&self) -> bool {
        matches!(self.kind, NormalizeErrorKind::Shape { .. })
    }

    /// Returns true if the posterior held NaN or infinite values.
    pub fn is_non_finite(&self) -> bool {
        matches!(self.kind, NormalizeErrorKind::NonFinite { .. })
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for NormalizeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeErrorKind::Shape { quantity, detail } => {
                write!(f, "posterior '{quantity}' has an unusable shape: {detail}")
            }
            NormalizeErrorKind::NonFinite { quantity, channel } => {
                write!(f, "posterior '{quantity}' is not finite for channel '{channel}'")
            }
        }
    }
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for NormalizeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_message_names_quantity() {
        let err = NormalizeError::shape("roi", "last axis is 3, expected 2 channels");
        assert!(err.is_shape());
        assert!(!err.is_non_finite());
        assert!(err.to_string().contains("'roi'"));
    }
}
