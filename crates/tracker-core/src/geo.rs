//! Great-circle distance between coordinates.
//!
//! Distances use the haversine formula on a spherical Earth of radius
//! [`EARTH_RADIUS_KM`], which stays well conditioned for the short hops
//! between consecutive GPS fixes.

use tracker_types::Coordinate;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres to statute miles.
pub const KM_TO_MILES: f64 = 0.621371192;

/// Metres to feet.
pub const METRE_TO_FEET: f64 = 3.2808399;

/// Metres per second to miles per hour.
pub const MPS_TO_MPH: f64 = 2.23693629;

/// Haversine distance in kilometres between two points given in degrees.
///
/// Identical points are exactly zero apart.
///
/// ```
/// use tracker_core::geo::haversine_km;
///
/// let d = haversine_km(51.5, -0.1, 51.6, -0.1);
/// assert!((d - 11.1195).abs() < 1e-3);
/// assert_eq!(haversine_km(51.5, -0.1, 51.5, -0.1), 0.0);
/// ```
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let half_dlat = (lat2 - lat1).to_radians() / 2.0;
    let half_dlon = (lon2 - lon1).to_radians() / 2.0;

    let a = half_dlat.sin().powi(2) + phi1.cos() * phi2.cos() * half_dlon.sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Haversine distance in kilometres between two coordinates.
#[must_use]
pub fn distance_km(from: Coordinate, to: Coordinate) -> f64 {
    haversine_km(from.latitude, from.longitude, to.latitude, to.longitude)
}

/// Convert kilometres to whole miles, rounding half away from zero.
#[must_use]
pub fn km_to_whole_miles(km: f64, factor: f64) -> i64 {
    (km * factor).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Spherical law of cosines, used as an independent reference.
    fn spherical_law_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
        let dlon = (lon2 - lon1).to_radians();
        let cos_c = phi1.sin() * phi2.sin() + phi1.cos() * phi2.cos() * dlon.cos();
        EARTH_RADIUS_KM * cos_c.clamp(-1.0, 1.0).acos()
    }

    #[test]
    fn test_identical_points() {
        assert_eq!(haversine_km(51.5, -0.1, 51.5, -0.1), 0.0);
        assert_eq!(haversine_km(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(haversine_km(-89.9, 179.9, -89.9, 179.9), 0.0);
    }

    #[test]
    fn test_tenth_of_a_degree_of_latitude() {
        let d = haversine_km(51.5, -0.1, 51.6, -0.1);
        let expected = EARTH_RADIUS_KM * 0.1_f64.to_radians();
        assert!((d - expected).abs() < 1e-9);
    }

    #[test]
    fn test_london_to_paris() {
        let d = distance_km(Coordinate::new(51.5074, -0.1278), Coordinate::new(48.8566, 2.3522));
        assert!((d - 343.5).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_antipodes() {
        let d = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!((d - EARTH_RADIUS_KM * std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn test_whole_miles() {
        assert_eq!(km_to_whole_miles(0.0, KM_TO_MILES), 0);
        assert_eq!(km_to_whole_miles(12.4, KM_TO_MILES), 8);
        assert_eq!(km_to_whole_miles(1.609344, KM_TO_MILES), 1);
    }

    fn latitude() -> impl Strategy<Value = f64> {
        -90.0..=90.0f64
    }

    fn longitude() -> impl Strategy<Value = f64> {
        -180.0..=180.0f64
    }

    proptest! {
        #[test]
        fn distance_to_self_is_zero(lat in latitude(), lon in longitude()) {
            prop_assert_eq!(haversine_km(lat, lon, lat, lon), 0.0);
        }

        #[test]
        fn distance_is_symmetric(
            lat1 in latitude(), lon1 in longitude(),
            lat2 in latitude(), lon2 in longitude(),
        ) {
            let there = haversine_km(lat1, lon1, lat2, lon2);
            let back = haversine_km(lat2, lon2, lat1, lon1);
            prop_assert!((there - back).abs() < 1e-9);
        }

        #[test]
        fn distance_is_bounded(
            lat1 in latitude(), lon1 in longitude(),
            lat2 in latitude(), lon2 in longitude(),
        ) {
            let d = haversine_km(lat1, lon1, lat2, lon2);
            prop_assert!(d >= 0.0);
            prop_assert!(d <= EARTH_RADIUS_KM * std::f64::consts::PI + 1e-6);
        }

        #[test]
        fn agrees_with_law_of_cosines(
            lat1 in -80.0..80.0f64, lon1 in longitude(),
            lat2 in -80.0..80.0f64, lon2 in longitude(),
        ) {
            let d = haversine_km(lat1, lon1, lat2, lon2);
            // The cosine form loses precision below a few metres
            prop_assume!(d > 1.0);
            prop_assert!((d - spherical_law_km(lat1, lon1, lat2, lon2)).abs() < 1e-3);
        }
    }
}
