//! Shared types for the GPS tracker.
//!
//! This crate provides the data model used by the store, the ingestion
//! pipeline and the tracking-service client:
//!
//! - [`PositionSample`]: a raw fix as reported by the tracking service
//! - [`TrackRow`]: a fix placed in a daily track, with its incremental distance
//! - [`Coordinate`]: a latitude/longitude pair
//! - [`DayTag`]: the `YYYYMMDD` identifier partitioning fixes into daily tracks
//!
//! # Example
//!
//! ```
//! use tracker_types::{DayTag, PositionSample, TrackRow};
//! use time::UtcOffset;
//!
//! let sample = PositionSample {
//!     device_key: "584739201".into(),
//!     timestamp: 1_314_198_000,
//!     latitude: 51.5,
//!     longitude: -0.1,
//!     altitude: 12.0,
//!     speed: 4.5,
//!     heading: 90.0,
//! };
//! let tag = DayTag::from_timestamp(sample.timestamp, UtcOffset::UTC)?;
//! let row = TrackRow::from_sample(&sample, tag, None, 0.0);
//! assert_eq!(row.tag.to_string(), "20110824");
//! # Ok::<(), tracker_types::ParseError>(())
//! ```

pub mod error;
pub mod tag;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use tag::DayTag;
pub use types::{Coordinate, PositionSample, TrackRow};
