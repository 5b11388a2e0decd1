//! Last known location report.

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};

use tracker_store::{Result, Store};
use tracker_types::{Coordinate, DayTag};

use crate::config::UnitsConfig;
use crate::mileage::MileageAggregator;

/// The most recent fix, in display units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastLocation {
    pub device_key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    pub coordinate: Coordinate,
    /// Altitude in whole feet.
    pub altitude_ft: i64,
    /// Speed in whole miles per hour.
    pub speed_mph: i64,
    /// Heading in degrees.
    pub heading: f64,
    /// Whole miles covered on the current day.
    pub todays_miles: i64,
}

/// Report the newest fix recorded at or after `start_timestamp`.
///
/// Returns `None` when nothing has been recorded since the start date.
pub fn last_location(
    store: &Store,
    start_timestamp: i64,
    units: &UnitsConfig,
    utc_offset: UtcOffset,
) -> Result<Option<LastLocation>> {
    last_location_as_of(
        store,
        start_timestamp,
        units,
        utc_offset,
        &DayTag::today(utc_offset),
    )
}

/// [`last_location`] with an explicit current day.
pub fn last_location_as_of(
    store: &Store,
    start_timestamp: i64,
    units: &UnitsConfig,
    utc_offset: UtcOffset,
    today: &DayTag,
) -> Result<Option<LastLocation>> {
    let Some(position) = store.latest_position(start_timestamp)? else {
        return Ok(None);
    };

    let todays_miles = MileageAggregator::new(store, units.km_to_miles, utc_offset)
        .miles_for_tag(today)?;

    Ok(Some(LastLocation {
        device_key: position.device_key,
        recorded_at: position.recorded_at,
        coordinate: position.coordinate,
        altitude_ft: (position.altitude * units.metre_to_feet).round() as i64,
        speed_mph: (position.speed * units.mps_to_mph).round() as i64,
        heading: position.heading,
        todays_miles,
    }))
}

#[cfg(test)]
mod tests {
    use tracker_types::TrackRow;

    use super::*;

    fn tag(s: &str) -> DayTag {
        s.parse().unwrap()
    }

    fn row(timestamp: i64, latitude: f64, distance_km: f64, day: &str) -> TrackRow {
        TrackRow {
            device_key: "584739201".to_string(),
            timestamp,
            previous: None,
            coordinate: Coordinate::new(latitude, -0.1),
            altitude: 100.0,
            speed: 10.0,
            heading: 270.0,
            distance_km,
            tag: tag(day),
        }
    }

    #[test]
    fn test_empty_store() {
        let store = Store::open_in_memory().unwrap();
        let report =
            last_location(&store, 0, &UnitsConfig::default(), UtcOffset::UTC).unwrap();
        assert_eq!(report, None);
    }

    #[test]
    fn test_last_location() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_samples(&[
                row(1_314_198_000, 51.5, 0.0, "20110824"),
                row(1_314_198_060, 51.6, 16.0, "20110824"),
            ])
            .unwrap();

        let report = last_location_as_of(
            &store,
            1_314_144_000,
            &UnitsConfig::default(),
            UtcOffset::UTC,
            &tag("20110824"),
        )
        .unwrap()
        .unwrap();

        assert_eq!(report.recorded_at.unix_timestamp(), 1_314_198_060);
        assert_eq!(report.coordinate, Coordinate::new(51.6, -0.1));
        assert_eq!(report.altitude_ft, 328);
        assert_eq!(report.speed_mph, 22);
        assert_eq!(report.heading, 270.0);
        assert_eq!(report.todays_miles, 10);
    }

    #[test]
    fn test_fixes_before_start_are_ignored() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_samples(&[row(1_314_198_000, 51.5, 0.0, "20110824")])
            .unwrap();

        let report = last_location(
            &store,
            1_314_198_001,
            &UnitsConfig::default(),
            UtcOffset::UTC,
        )
        .unwrap();
        assert_eq!(report, None);
    }

    #[test]
    fn test_todays_miles_only_count_today() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_samples(&[row(1_314_198_000, 51.5, 16.0, "20110824")])
            .unwrap();

        let report = last_location_as_of(
            &store,
            0,
            &UnitsConfig::default(),
            UtcOffset::UTC,
            &tag("20110825"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(report.todays_miles, 0);
    }
}
