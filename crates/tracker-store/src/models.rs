//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use tracker_types::{Coordinate, DayTag, TrackRow};

/// A track row as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPosition {
    /// Database row ID.
    pub id: i64,
    /// Key of the reporting device.
    pub device_key: String,
    /// When the fix was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    /// Preceding point of the same track.
    pub previous: Option<Coordinate>,
    /// Position of the fix.
    pub coordinate: Coordinate,
    /// Altitude in metres.
    pub altitude: f64,
    /// Ground speed in metres per second.
    pub speed: f64,
    /// Heading in degrees.
    pub heading: f64,
    /// Distance from the preceding point in kilometres.
    pub distance_km: f64,
    /// Daily track the fix belongs to.
    pub tag: DayTag,
}

impl StoredPosition {
    /// Convert back to a [`TrackRow`].
    pub fn to_track_row(&self) -> TrackRow {
        TrackRow {
            device_key: self.device_key.clone(),
            timestamp: self.recorded_at.unix_timestamp(),
            previous: self.previous,
            coordinate: self.coordinate,
            altitude: self.altitude,
            speed: self.speed,
            heading: self.heading,
            distance_km: self.distance_km,
            tag: self.tag,
        }
    }
}

/// Settled mileage of a completed day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMileage {
    /// Day the mileage belongs to.
    pub tag: DayTag,
    /// Settled distance in miles.
    pub mileage: f64,
    /// When the mileage was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub settled_at: OffsetDateTime,
}

/// Per-track summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSummary {
    /// Day the track covers.
    pub tag: DayTag,
    /// Number of stored fixes.
    pub points: u64,
    /// Accumulated distance in kilometres.
    pub distance_km: f64,
    /// First fix of the day.
    #[serde(with = "time::serde::rfc3339")]
    pub first_at: OffsetDateTime,
    /// Last fix of the day.
    #[serde(with = "time::serde::rfc3339")]
    pub last_at: OffsetDateTime,
}
