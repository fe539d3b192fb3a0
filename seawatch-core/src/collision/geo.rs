//! Spherical earth helpers.

use super::types::VesselState;
use super::EARTH_RADIUS_NM;

/// Great-circle distance in nautical miles (haversine).
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_NM * c
}

/// Initial great-circle bearing from point 1 to point 2, [0, 360).
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    normalize_angle(y.atan2(x).to_degrees())
}

/// Wrap an angle into [0, 360).
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Dead-reckon `state` forward by `minutes` at constant course and speed.
///
/// Returns `(latitude, longitude)`. Uses a flat-earth step, good for the
/// short horizons of collision work.
pub fn predict_position(state: &VesselState, minutes: f64) -> (f64, f64) {
    let distance_deg = state.speed_over_ground * (minutes / 60.0) / 60.0;
    let cog = state.course_over_ground.to_radians();

    let lat = state.latitude + distance_deg * cog.cos();
    let lon = state.longitude + distance_deg * cog.sin() / state.latitude.to_radians().cos();
    (lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_nm(0.0, 0.0, 1.0, 0.0);
        // One degree of arc on a 3440.065 NM sphere
        assert!((d - 60.04).abs() < 0.01);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = haversine_nm(59.3, 18.1, 59.4, 18.3);
        let b = haversine_nm(59.4, 18.3, 59.3, 18.1);
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_bearing_cardinal() {
        assert!((initial_bearing(0.0, 0.0, 1.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((initial_bearing(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((initial_bearing(0.0, 0.0, -1.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((initial_bearing(0.0, 0.0, 0.0, -1.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_angle() {
        assert_eq!(normalize_angle(-90.0), 270.0);
        assert_eq!(normalize_angle(720.0), 0.0);
        assert_eq!(normalize_angle(359.5), 359.5);
    }

    #[test]
    fn test_predict_position() {
        // 12 knots north for 30 minutes is 6 NM, a tenth of a degree
        let state = VesselState::new(10.0, 20.0, 0.0, 12.0);
        let (lat, lon) = predict_position(&state, 30.0);
        assert!((lat - 10.1).abs() < 1e-9);
        assert!((lon - 20.0).abs() < 1e-9);

        let east = VesselState::new(0.0, 0.0, 90.0, 6.0);
        let (lat, lon) = predict_position(&east, 60.0);
        assert!(lat.abs() < 1e-9);
        assert!((lon - 0.1).abs() < 1e-9);
    }
}
