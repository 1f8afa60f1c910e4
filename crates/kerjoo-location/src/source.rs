use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;

use kerjoo_core::{Coordinates, LocationErrorReason};
use tokio::sync::mpsc;

use crate::PositionOptions;

/// One position reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fix {
    pub coords: Coordinates,
    /// Horizontal accuracy radius reported by the device, when known.
    pub accuracy_m: Option<f64>,
}

impl Fix {
    pub fn at(lat: f64, lon: f64) -> Self {
        Self { coords: Coordinates { lat, lon }, accuracy_m: None }
    }
}

pub type FixResult = Result<Fix, LocationErrorReason>;

/// Device geolocation capability.
///
/// `current_position` may never resolve; the caller bounds it with
/// `options.timeout`.
pub trait PositionSource: Send + Sync {
    fn current_position(&self, options: PositionOptions) -> impl Future<Output = FixResult> + Send;

    /// Continuous updates until the source or the receiver goes away.
    fn watch(&self) -> mpsc::Receiver<FixResult>;
}

/// Always answers with the same result. Used by the CLI, where the position
/// comes from command-line flags.
#[derive(Clone, Copy, Debug)]
pub struct FixedSource {
    result: FixResult,
}

impl FixedSource {
    pub fn new(fix: Fix) -> Self {
        Self { result: Ok(fix) }
    }

    pub fn failing(reason: LocationErrorReason) -> Self {
        Self { result: Err(reason) }
    }
}

impl PositionSource for FixedSource {
    fn current_position(&self, _options: PositionOptions) -> impl Future<Output = FixResult> + Send {
        std::future::ready(self.result)
    }

    fn watch(&self) -> mpsc::Receiver<FixResult> {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(self.result);
        rx
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    Answer(FixResult),
    /// Never answers.
    Hang,
}

/// Replays a fixed script of answers and records every request it sees.
/// An exhausted script answers `PositionUnavailable`.
#[derive(Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    watch_updates: Vec<FixResult>,
    requests: Mutex<Vec<PositionOptions>>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self { steps: Mutex::new(steps.into_iter().collect()), ..Default::default() }
    }

    pub fn with_watch_updates(mut self, updates: Vec<FixResult>) -> Self {
        self.watch_updates = updates;
        self
    }

    /// Options of every `current_position` call so far, in order.
    pub fn requests(&self) -> Vec<PositionOptions> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl PositionSource for ScriptedSource {
    fn current_position(&self, options: PositionOptions) -> impl Future<Output = FixResult> + Send {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(options);
        }
        let step = self
            .steps
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(Step::Answer(Err(LocationErrorReason::PositionUnavailable)));
        async move {
            match step {
                Step::Answer(result) => result,
                Step::Hang => std::future::pending().await,
            }
        }
    }

    fn watch(&self) -> mpsc::Receiver<FixResult> {
        let (tx, rx) = mpsc::channel(self.watch_updates.len().max(1));
        for update in &self.watch_updates {
            let _ = tx.try_send(*update);
        }
        rx
    }
}
