//! Error types for data parsing in tracker-types.

use thiserror::Error;

/// Errors that can occur when parsing tracker data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A day tag was not in `YYYYMMDD` form.
    #[error("Invalid day tag '{0}': expected YYYYMMDD")]
    InvalidDayTag(String),

    /// A unix timestamp fell outside the representable date range.
    #[error("Timestamp {0} is out of range")]
    TimestampOutOfRange(i64),

    /// Failed to parse a value for another reason.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using tracker-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
