//! Error types for imgcalc

use thiserror::Error;

/// Coarse classification of an [`Error`].
///
/// Configuration errors are raised before (or at the very start of) pixel
/// iteration. Numeric failures abort a pass that is already running. I/O
/// failures come from drivers and file parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NumericFailure,
    Io,
}

/// Main error type for imgcalc operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid raster dimensions: {rows}x{cols}")]
    InvalidDimensions { rows: usize, cols: usize },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Band index {index} out of range ({available} bands available)")]
    BandIndex { index: usize, available: usize },

    #[error("Output band mismatch: calculator produces {expected} bands, output has {actual}")]
    OutputBands { expected: usize, actual: usize },

    #[error("Window size must be odd and >= 1, got {0}")]
    WindowSize(usize),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    #[error("Numeric failure: {0}")]
    Numeric(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Parse error in {source_name} at line {line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Csv(_) | Error::Parse { .. } | Error::UnsupportedDataType(_) => ErrorKind::Io,
            Error::Numeric(_) | Error::Cancelled => ErrorKind::NumericFailure,
            Error::InvalidDimensions { .. }
            | Error::SizeMismatch { .. }
            | Error::BandIndex { .. }
            | Error::OutputBands { .. }
            | Error::WindowSize(_)
            | Error::InvalidParameter { .. }
            | Error::SingularMatrix(_) => ErrorKind::Configuration,
            Error::Other(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for [`Error::InvalidParameter`]
    pub fn invalid_param(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for imgcalc operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::WindowSize(4).kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::BandIndex { index: 3, available: 2 }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(Error::Numeric("svd".into()).kind(), ErrorKind::NumericFailure);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(Error::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_band_index_message_reports_index() {
        let msg = Error::BandIndex { index: 7, available: 3 }.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('3'));
    }
}
