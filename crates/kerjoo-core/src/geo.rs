use crate::types::{Coordinates, Geofence};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters (haversine, spherical Earth).
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin() * (dphi / 2.0).sin()
        + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin() * (dlambda / 2.0).sin();
    // rounding can push `a` just past 1 near the antipode
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Inclusive: a point exactly `radius_m` away is inside.
pub fn within_radius(current_lat: f64, current_lon: f64, target_lat: f64, target_lon: f64, radius_m: f64) -> bool {
    distance_m(current_lat, current_lon, target_lat, target_lon) <= radius_m
}

impl Coordinates {
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        distance_m(self.lat, self.lon, other.lat, other.lon)
    }
}

impl Geofence {
    pub fn distance_from(&self, position: &Coordinates) -> f64 {
        position.distance_to(&self.center)
    }

    pub fn contains(&self, position: &Coordinates) -> bool {
        within_radius(position.lat, position.lon, self.center.lat, self.center.lon, f64::from(self.radius_m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_DEGREE_M: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

    #[test]
    fn same_point_is_zero() {
        assert_eq!(distance_m(-6.2, 106.816666, -6.2, 106.816666), 0.0);
        assert_eq!(distance_m(89.9, -179.0, 89.9, -179.0), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = distance_m(-6.2, 106.816666, -6.914744, 107.609810);
        let ba = distance_m(-6.914744, 107.609810, -6.2, 106.816666);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = distance_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 111_195.0 * 0.01, "got {d}");
    }

    #[test]
    fn near_antipodes_stay_finite() {
        let half_circumference = EARTH_RADIUS_METERS * std::f64::consts::PI;
        for step in 0..=2_000 {
            let lat = -1.0 + f64::from(step) / 1_000.0;
            let d = distance_m(lat, 0.0, -lat, 180.0);
            assert!(d.is_finite(), "NaN at lat {lat}");
            assert!((d - half_circumference).abs() < 1.0, "lat {lat}: {d}");
            assert!((d - distance_m(-lat, 180.0, lat, 0.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn boundary_is_inclusive() {
        let dlat = 100.0 / ONE_DEGREE_M;
        let d = distance_m(dlat, 0.0, 0.0, 0.0);
        assert!(within_radius(dlat, 0.0, 0.0, 0.0, d));
        assert!(!within_radius(dlat, 0.0, 0.0, 0.0, d - 0.001));
    }

    #[test]
    fn geofence_contains_nearby_point() {
        let fence = Geofence {
            center: Coordinates { lat: -6.2, lon: 106.816666 },
            radius_m: 100,
            name: None,
        };
        let near = Coordinates { lat: -6.2 + 80.0 / ONE_DEGREE_M, lon: 106.816666 };
        let far = Coordinates { lat: -6.2 + 150.0 / ONE_DEGREE_M, lon: 106.816666 };
        assert!(fence.contains(&near));
        assert!(!fence.contains(&far));
        assert_eq!(fence.distance_from(&far).round(), 150.0);
    }
}
