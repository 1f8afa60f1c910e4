use std::sync::{Arc, Mutex};
use std::time::Duration;

use kerjoo_core::{decide_retry, falls_back_to_low_accuracy, LocationErrorReason, RetryDecision};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::{Fix, FixResult, LocationSettings, PositionOptions, PositionSource};

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("no position after {attempts} attempt(s): {reason}")]
    Failed { reason: LocationErrorReason, attempts: u32 },
    #[error("position request cancelled")]
    Cancelled,
}

impl AcquireError {
    pub fn reason(&self) -> Option<LocationErrorReason> {
        match self {
            AcquireError::Failed { reason, .. } => Some(*reason),
            AcquireError::Cancelled => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct CachedFix {
    fix: Fix,
    received: Instant,
}

type FixCache = Arc<Mutex<Option<CachedFix>>>;

/// Wraps a [`PositionSource`] with the acquisition policy and a cache of the
/// last good fix.
pub struct Locator<S> {
    source: S,
    settings: LocationSettings,
    cache: FixCache,
}

impl<S: PositionSource> Locator<S> {
    pub fn new(source: S, settings: LocationSettings) -> Self {
        Self { source, settings, cache: Arc::new(Mutex::new(None)) }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Most recent good fix, however old.
    pub fn last_fix(&self) -> Option<Fix> {
        self.cache.lock().ok().and_then(|c| (*c).map(|c| c.fix))
    }

    /// One-shot acquisition: high accuracy, low-accuracy fallback, then retry
    /// up to the configured attempt count. Permission denial ends it at once.
    pub async fn acquire(&self) -> Result<Fix, AcquireError> {
        let policy = self.settings.policy();
        let mut attempt = 1;
        loop {
            match self.attempt().await {
                Ok(fix) => {
                    debug!(attempt, lat = fix.coords.lat, lon = fix.coords.lon, "position acquired");
                    return Ok(fix);
                }
                Err(reason) => match decide_retry(&policy, reason, attempt) {
                    RetryDecision::RetryAfterMs(ms) => {
                        warn!(attempt, %reason, "position attempt failed; retrying in {ms}ms");
                        sleep(Duration::from_millis(ms)).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        warn!(attempt, %reason, "giving up on position");
                        return Err(AcquireError::Failed { reason, attempts: attempt });
                    }
                },
            }
        }
    }

    /// Like [`Locator::acquire`], but returns `Cancelled` as soon as `cancel`
    /// flips to `true`. A dropped sender never cancels.
    pub async fn acquire_cancellable(&self, mut cancel: watch::Receiver<bool>) -> Result<Fix, AcquireError> {
        if *cancel.borrow() {
            return Err(AcquireError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                info!("position request cancelled");
                Err(AcquireError::Cancelled)
            }
            res = self.acquire() => res,
        }
    }

    /// Continuous updates from the source. Failures are passed through and the
    /// watcher keeps waiting; good fixes also refresh the cache. Dropping the
    /// receiver stops the forwarding task.
    pub fn watch(&self) -> mpsc::Receiver<FixResult> {
        let mut updates = self.source.watch();
        let (tx, rx) = mpsc::channel(16);
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        debug!("watch receiver dropped");
                        break;
                    }
                    update = updates.recv() => {
                        let Some(update) = update else { break };
                        match &update {
                            Ok(fix) => remember(&cache, *fix),
                            Err(reason) => warn!(%reason, "watch update failed; waiting for next fix"),
                        }
                        if tx.send(update).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }

    async fn attempt(&self) -> FixResult {
        match self.request(self.settings.high()).await {
            Ok(fix) => Ok(fix),
            Err(reason) if falls_back_to_low_accuracy(reason) => {
                debug!(%reason, "high accuracy failed; falling back to low accuracy");
                self.request(self.settings.low()).await
            }
            Err(reason) => Err(reason),
        }
    }

    async fn request(&self, options: PositionOptions) -> FixResult {
        if let Some(fix) = self.cached_within(options.maximum_age) {
            return Ok(fix);
        }
        let result = match timeout(options.timeout, self.source.current_position(options)).await {
            Ok(result) => result,
            Err(_) => Err(LocationErrorReason::Timeout),
        };
        if let Ok(fix) = &result {
            remember(&self.cache, *fix);
        }
        result
    }

    fn cached_within(&self, maximum_age: Duration) -> Option<Fix> {
        let cached = self.cache.lock().ok().and_then(|c| *c)?;
        (cached.received.elapsed() <= maximum_age).then_some(cached.fix)
    }
}

fn remember(cache: &FixCache, fix: Fix) {
    if let Ok(mut c) = cache.lock() {
        *c = Some(CachedFix { fix, received: Instant::now() });
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixedSource, ScriptedSource, Step};

    #[tokio::test(start_paused = true)]
    async fn first_try_uses_high_accuracy() {
        let locator = Locator::new(ScriptedSource::new([Step::Answer(Ok(Fix::at(-6.2, 106.8)))]), LocationSettings::default());
        let fix = locator.acquire().await.unwrap();
        assert_eq!(fix, Fix::at(-6.2, 106.8));
        let requests = locator.source().requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].high_accuracy);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_failing_source_reports_reason() {
        let locator = Locator::new(FixedSource::failing(LocationErrorReason::PermissionDenied), LocationSettings::default());
        let err = locator.acquire().await.unwrap_err();
        assert_eq!(err, AcquireError::Failed { reason: LocationErrorReason::PermissionDenied, attempts: 1 });
        assert_eq!(err.reason(), Some(LocationErrorReason::PermissionDenied));
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_returns_immediately() {
        let (_tx, rx) = watch::channel(true);
        let locator = Locator::new(ScriptedSource::new([Step::Hang]), LocationSettings::default());
        assert_eq!(locator.acquire_cancellable(rx).await.unwrap_err(), AcquireError::Cancelled);
        assert!(locator.source().requests().is_empty());
    }
}
