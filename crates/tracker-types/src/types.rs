//! Core types for position samples and persisted track rows.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::tag::DayTag;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and within the valid degree ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// A single position report received from the tracking service.
///
/// Field names follow the service's JSON payload so samples deserialize
/// directly from a batch response.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PositionSample {
    /// Key of the reporting device.
    pub device_key: String,
    /// Unix timestamp of the fix, in seconds.
    pub timestamp: i64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in metres.
    #[cfg_attr(feature = "serde", serde(default))]
    pub altitude: f64,
    /// Ground speed in metres per second.
    #[cfg_attr(feature = "serde", serde(default))]
    pub speed: f64,
    /// Heading in degrees from north.
    #[cfg_attr(feature = "serde", serde(default))]
    pub heading: f64,
}

impl PositionSample {
    /// The sample's position.
    #[must_use]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A position sample enriched with its place in a daily track.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackRow {
    /// Key of the reporting device.
    pub device_key: String,
    /// Unix timestamp of the fix, in seconds.
    pub timestamp: i64,
    /// Preceding point of the same track, if any.
    pub previous: Option<Coordinate>,
    /// Position of this fix.
    pub coordinate: Coordinate,
    /// Altitude in metres.
    pub altitude: f64,
    /// Ground speed in metres per second.
    pub speed: f64,
    /// Heading in degrees from north.
    pub heading: f64,
    /// Great-circle distance from `previous`, in kilometres (0 when there is none).
    pub distance_km: f64,
    /// Day the fix belongs to.
    pub tag: DayTag,
}

impl TrackRow {
    /// Build a row for `sample`, placed after `previous` in track `tag`.
    ///
    /// `distance_km` is supplied by the caller since this crate carries no
    /// geometry.
    #[must_use]
    pub fn from_sample(
        sample: &PositionSample,
        tag: DayTag,
        previous: Option<Coordinate>,
        distance_km: f64,
    ) -> Self {
        Self {
            device_key: sample.device_key.clone(),
            timestamp: sample.timestamp,
            previous,
            coordinate: sample.coordinate(),
            altitude: sample.altitude,
            speed: sample.speed,
            heading: sample.heading,
            distance_km,
            tag,
        }
    }
}
