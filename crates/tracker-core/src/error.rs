//! Error types for tracker-core.

use std::path::PathBuf;

use tracker_types::DayTag;

/// Errors raised while pulling positions from a data source.
///
/// Any of these aborts an ingestion run before anything is persisted.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SourceError {
    /// The tracking service could not be reached.
    #[cfg(feature = "tracking-client")]
    #[error("Tracking service not reachable at {url}: {source}")]
    NotReachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body could not be read.
    #[cfg(feature = "tracking-client")]
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Invalid service URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The service answered with an error status.
    #[error("Tracking service error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The payload was not a position batch.
    #[error("Malformed position payload: {0}")]
    Malformed(String),

    /// The source is temporarily unable to answer.
    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Result type for data source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Errors raised while exporting tracks.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExportError {
    /// The track has no stored points.
    #[error("Track {0} has no points")]
    EmptyTrack(DayTag),

    /// Failed to write an export file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
