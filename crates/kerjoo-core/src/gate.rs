use crate::{Coordinates, Geofence, LocationErrorReason, WorkflowError};

/// Result of a presence check that did not reject the action.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GateOutcome {
    /// No geofence configured; any position, or none, is accepted.
    Open,
    Verified { position: Coordinates, distance_m: f64 },
}

impl GateOutcome {
    /// Coordinates to attach to the resulting record, if any were verified.
    pub fn position(&self) -> Option<Coordinates> {
        match self {
            GateOutcome::Open => None,
            GateOutcome::Verified { position, .. } => Some(*position),
        }
    }
}

/// Same rule on the client (for feedback) and on the server (for integrity).
pub fn check_presence(geofence: Option<&Geofence>, position: Option<Coordinates>) -> Result<GateOutcome, WorkflowError> {
    let Some(fence) = geofence else {
        return Ok(GateOutcome::Open);
    };
    let Some(position) = position else {
        return Err(WorkflowError::LocationUnavailable { reason: LocationErrorReason::PositionUnavailable });
    };
    position.validate()?;

    let distance_m = fence.distance_from(&position);
    if distance_m <= f64::from(fence.radius_m) {
        Ok(GateOutcome::Verified { position, distance_m })
    } else {
        // a rejected distance never reads as inside the radius
        let reported = (distance_m.round() as u64).max(u64::from(fence.radius_m) + 1);
        Err(WorkflowError::OutOfRange { distance_m: reported, radius_m: fence.radius_m })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::EARTH_RADIUS_METERS;

    fn north_of(origin: Coordinates, meters: f64) -> Coordinates {
        let deg = meters / (EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0);
        Coordinates { lat: origin.lat + deg, lon: origin.lon }
    }

    fn site() -> Geofence {
        Geofence { center: Coordinates { lat: -6.200000, lon: 106.816666 }, radius_m: 100, name: Some("Gedung A".into()) }
    }

    #[test]
    fn no_fence_is_open_even_without_position() {
        assert_eq!(check_presence(None, None).unwrap(), GateOutcome::Open);
    }

    #[test]
    fn rejects_150m_accepts_80m() {
        let fence = site();
        let err = check_presence(Some(&fence), Some(north_of(fence.center, 150.0))).unwrap_err();
        assert_eq!(err, WorkflowError::OutOfRange { distance_m: 150, radius_m: 100 });

        let ok = check_presence(Some(&fence), Some(north_of(fence.center, 80.0))).unwrap();
        assert!(matches!(ok, GateOutcome::Verified { distance_m, .. } if (distance_m - 80.0).abs() < 0.5));
        assert!(ok.position().is_some());
    }

    #[test]
    fn just_outside_never_reports_the_radius() {
        let fence = site();
        let err = check_presence(Some(&fence), Some(north_of(fence.center, 100.4))).unwrap_err();
        assert_eq!(err, WorkflowError::OutOfRange { distance_m: 101, radius_m: 100 });
    }

    #[test]
    fn missing_position_with_fence_is_unavailable() {
        let err = check_presence(Some(&site()), None).unwrap_err();
        assert!(matches!(err, WorkflowError::LocationUnavailable { .. }));
    }

    #[test]
    fn forged_out_of_range_coordinates_rejected() {
        let err = check_presence(Some(&site()), Some(Coordinates { lat: 120.0, lon: 0.0 })).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }
}
