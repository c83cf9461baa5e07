//! Error types for input adaptation.

use std::backtrace::Backtrace;
use std::fmt;

/// Error type for input adaptation.
///
/// Configuration and shape errors mean the input is unusable; callers must
/// abort rather than fall back.
#[derive(Debug)]
pub struct AdapterError {
    kind: AdapterErrorKind,
    backtrace: Backtrace,
}

/// Internal error variants. Not exposed publicly; use `is_xxx()` methods.
#[derive(Debug)]
pub(crate) enum AdapterErrorKind {
    /// A logical field could not be bound to usable input.
    Configuration { field: String, detail: String },
    /// Array or table dimensions disagree.
    Shape(String),
    /// A cell in a numeric column is blank or not a finite number.
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },
    /// A spend cell is below zero.
    NegativeSpend {
        column: String,
        row: usize,
        value: f64,
    },
    /// Reading the input file failed.
    Io(std::io::Error),
    /// The CSV reader rejected the input.
    Csv(csv::Error),
}

impl AdapterError {
    /// Creates an error from an error kind, capturing a backtrace.
    pub(crate) fn new(kind: AdapterErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    pub(crate) fn configuration(
        field: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(AdapterErrorKind::Configuration {
            field: field.into(),
            detail: detail.into(),
        })
    }

    pub(crate) fn shape(detail: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Shape(detail.into()))
    }

    pub(crate) fn invalid_value(
        column: impl Into<String>,
        row: usize,
        value: impl Into<String>,
    ) -> Self {
        Self::new(AdapterErrorKind::InvalidValue {
            column: column.into(),
            row,
            value: value.into(),
        })
    }

    pub(crate) fn negative_spend(
        column: impl Into<String>,
        row: usize,
        value: f64,
    ) -> Self {
        Self::new(AdapterErrorKind::NegativeSpend {
            column: column.into(),
            row,
            value,
        })
    }

    /// Returns true if a logical field could not be resolved.
    pub fn is_configuration(&self) -> bool {
        matches!(self.kind, AdapterErrorKind::Configuration { .. })
    }

    /// Returns true if dimensions were inconsistent.
    pub fn is_shape(&self) -> bool {
        matches!(self.kind, AdapterErrorKind::Shape(_))
    }

    /// Returns true if a numeric cell could not be parsed or a spend cell
    /// is negative.
    pub fn is_invalid_value(&self) -> bool {
        matches!(
            self.kind,
            AdapterErrorKind::InvalidValue { .. }
                | AdapterErrorKind::NegativeSpend { .. }
        )
    }

    /// Returns true if the input could not be read.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, AdapterErrorKind::Io(_))
    }

    /// Returns true if the CSV reader failed.
    pub fn is_csv(&self) -> bool {
        matches!(self.kind, AdapterErrorKind::Csv(_))
    }

    /// The logical configuration field at fault, for configuration errors.
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            AdapterErrorKind::Configuration { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterErrorKind::Configuration { field, detail } => {
                write!(f, "{field}: {detail}")
            }
            AdapterErrorKind::Shape(detail) => {
                write!(f, "shape mismatch: {detail}")
            }
            AdapterErrorKind::InvalidValue { column, row, value } => {
                write!(
                    f,
                    "column '{column}' row {row}: '{value}' is not a number"
                )
            }
            AdapterErrorKind::NegativeSpend { column, row, value } => {
                write!(f, "column '{column}' row {row}: spend {value} is negative")
            }
            AdapterErrorKind::Io(err) => {
                write!(f, "failed to read input table: {err}")
            }
            AdapterErrorKind::Csv(err) => {
                write!(f, "failed to parse input table: {err}")
            }
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            AdapterErrorKind::Io(err) => Some(err),
            AdapterErrorKind::Csv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        Self::new(AdapterErrorKind::Io(err))
    }
}

impl From<csv::Error> for AdapterError {
    fn from(err: csv::Error) -> Self {
        Self::new(AdapterErrorKind::Csv(err))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_configuration_names_field() {
        let err = AdapterError::configuration("target_column", "no KPI column");
        assert!(err.is_configuration());
        assert_eq!(err.field(), Some("target_column"));
        assert!(err.to_string().starts_with("target_column:"));
        assert!(err.source().is_none());
    }

    #[test]
    fn test_invalid_value_message() {
        let err = AdapterError::invalid_value("tv_spend", 4, "n/a");
        assert!(err.is_invalid_value());
        assert!(!err.is_shape());
        assert_eq!(err.field(), None);
        assert!(err.to_string().contains("row 4"));
    }

    #[test]
    fn test_io_has_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = AdapterError::from(io);
        assert!(err.is_io());
        assert!(err.source().is_some());
    }
}
