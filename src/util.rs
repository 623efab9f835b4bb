use crate::sample::Coordinate;

/// Mean Earth radius used for all great-circle math.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub const KM_PER_MILE: f64 = 1.609_344;

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Point reached by travelling `distance_km` from `from` on the given bearing
/// (degrees clockwise from north).
pub fn destination(from: Coordinate, bearing_deg: f64, distance_km: f64) -> Coordinate {
    let angular = distance_km / EARTH_RADIUS_KM;
    let bearing = bearing_deg.to_radians();
    let lat1 = from.latitude.to_radians();
    let lon1 = from.longitude.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Coordinate::new(lat2.to_degrees(), lon2.to_degrees())
}

/// `HH:MM:SS`
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero() {
        let p = Coordinate::new(55.0, 12.0);
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn test_haversine_hundredth_degree_on_equator() {
        let d = haversine_km(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.01));
        assert!((d - 1.111_949).abs() < 1e-5, "got {d}");
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = Coordinate::new(51.5, -0.12);
        let b = Coordinate::new(48.85, 2.35);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
        // London to Paris
        assert!((haversine_km(a, b) - 343.5).abs() < 2.0);
    }

    #[test]
    fn test_destination_round_trips_distance() {
        let start = Coordinate::new(55.68, 12.57);
        let end = destination(start, 90.0, 0.25);
        assert!((haversine_km(start, end) - 0.25).abs() < 1e-6);
        assert!(end.longitude > start.longitude);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(59), "00:00:59");
        assert_eq!(format_duration(3_725), "01:02:05");
    }
}
