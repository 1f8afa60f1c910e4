use anyhow::{anyhow, Result};
use clap::Args;
use kerjoo_core::{Coordinates, GateOutcome, Geofence, LocationErrorReason, WorkflowError};
use kerjoo_location::{Fix, FixedSource, GateError, LocationGate, LocationSettings, Locator};
use tracing::info;

/// Where the worker is, as reported by the device.
#[derive(Args, Clone, Copy, Debug, Default)]
pub struct PositionArgs {
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,
}

impl PositionArgs {
    pub fn fix(&self) -> Option<Fix> {
        Some(Fix::at(self.lat?, self.lon?))
    }
}

/// Client-side presence check before calling the server. Returns the
/// coordinates to send along; without a geofence the flags pass through as is.
pub async fn gate(settings: &LocationSettings, position: PositionArgs, geofence: Option<&Geofence>) -> Result<Option<Coordinates>> {
    let source = match position.fix() {
        Some(fix) => FixedSource::new(fix),
        None => FixedSource::failing(LocationErrorReason::PositionUnavailable),
    };
    let locator = Locator::new(source, settings.clone());
    match LocationGate::new(&locator).check(geofence).await {
        Ok(GateOutcome::Verified { position, distance_m }) => {
            info!(distance_m, "position inside geofence");
            Ok(Some(position))
        }
        Ok(GateOutcome::Open) => Ok(position.fix().map(|f| f.coords)),
        Err(GateError::Rejected(e)) => Err(explain(e)),
        Err(GateError::Cancelled) => Err(anyhow!("location request cancelled")),
    }
}

pub fn explain(e: WorkflowError) -> anyhow::Error {
    anyhow!("{e}\nhint: {}", e.user_hint())
}
