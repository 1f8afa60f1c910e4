use kerjoo_core::{check_presence, Geofence, GateOutcome, WorkflowError};
use thiserror::Error;
use tokio::sync::watch;

use crate::{AcquireError, Locator, PositionSource};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum GateError {
    #[error(transparent)]
    Rejected(#[from] WorkflowError),
    #[error("position request cancelled")]
    Cancelled,
}

impl From<AcquireError> for GateError {
    fn from(e: AcquireError) -> Self {
        match e {
            AcquireError::Failed { reason, .. } => GateError::Rejected(WorkflowError::LocationUnavailable { reason }),
            AcquireError::Cancelled => GateError::Cancelled,
        }
    }
}

/// Client half of the presence check: gives the worker immediate feedback and
/// captures the coordinates that travel with the request. The server repeats
/// the same check on what it receives.
pub struct LocationGate<'a, S> {
    locator: &'a Locator<S>,
}

impl<'a, S: PositionSource> LocationGate<'a, S> {
    pub fn new(locator: &'a Locator<S>) -> Self {
        Self { locator }
    }

    /// Without a geofence no position is requested at all.
    pub async fn check(&self, geofence: Option<&Geofence>) -> Result<GateOutcome, GateError> {
        let Some(fence) = geofence else {
            return Ok(GateOutcome::Open);
        };
        let fix = self.locator.acquire().await?;
        Ok(check_presence(Some(fence), Some(fix.coords))?)
    }

    pub async fn check_cancellable(
        &self,
        geofence: Option<&Geofence>,
        cancel: watch::Receiver<bool>,
    ) -> Result<GateOutcome, GateError> {
        let Some(fence) = geofence else {
            return Ok(GateOutcome::Open);
        };
        let fix = self.locator.acquire_cancellable(cancel).await?;
        Ok(check_presence(Some(fence), Some(fix.coords))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Fix, LocationSettings, ScriptedSource, Step};
    use kerjoo_core::{Coordinates, LocationErrorReason};

    fn fence() -> Geofence {
        Geofence { center: Coordinates { lat: -6.2, lon: 106.816666 }, radius_m: 100, name: None }
    }

    #[tokio::test(start_paused = true)]
    async fn no_fence_never_asks_for_position() {
        let locator = Locator::new(ScriptedSource::default(), LocationSettings::default());
        let outcome = LocationGate::new(&locator).check(None).await.unwrap();
        assert_eq!(outcome, GateOutcome::Open);
        assert!(locator.source().requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn far_fix_is_out_of_range() {
        let far = Fix::at(-6.2 + 150.0 / 111_194.93, 106.816666);
        let locator = Locator::new(ScriptedSource::new([Step::Answer(Ok(far))]), LocationSettings::default());
        let err = LocationGate::new(&locator).check(Some(&fence())).await.unwrap_err();
        assert_eq!(err, GateError::Rejected(WorkflowError::OutOfRange { distance_m: 150, radius_m: 100 }));
    }

    #[tokio::test(start_paused = true)]
    async fn near_fix_is_verified_with_coordinates() {
        let near = Fix::at(-6.2005, 106.816666);
        let locator = Locator::new(ScriptedSource::new([Step::Answer(Ok(near))]), LocationSettings::default());
        let outcome = LocationGate::new(&locator).check(Some(&fence())).await.unwrap();
        assert_eq!(outcome.position(), Some(near.coords));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_hanging_fix_cancels_the_gate() {
        let (tx, rx) = watch::channel(false);
        let locator = Locator::new(ScriptedSource::new([Step::Hang]), LocationSettings::default());
        let started = tokio::time::Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            let _ = tx.send(true);
        });

        let err = LocationGate::new(&locator).check_cancellable(Some(&fence()), rx).await.unwrap_err();
        assert_eq!(err, GateError::Cancelled);
        assert!(started.elapsed() < std::time::Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellable_check_without_fence_is_open() {
        let (_tx, rx) = watch::channel(false);
        let locator = Locator::new(ScriptedSource::default(), LocationSettings::default());
        let outcome = LocationGate::new(&locator).check_cancellable(None, rx).await.unwrap();
        assert_eq!(outcome, GateOutcome::Open);
        assert!(locator.source().requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn denied_permission_becomes_location_unavailable() {
        let locator = Locator::new(
            ScriptedSource::new([Step::Answer(Err(LocationErrorReason::PermissionDenied))]),
            LocationSettings::default(),
        );
        let err = LocationGate::new(&locator).check(Some(&fence())).await.unwrap_err();
        assert_eq!(
            err,
            GateError::Rejected(WorkflowError::LocationUnavailable { reason: LocationErrorReason::PermissionDenied })
        );
    }
}
