use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Outcome of one readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Check again after the regular interval.
    NotYet,
    /// Check again after the longer backoff interval.
    Backoff,
}

impl From<bool> for Readiness {
    fn from(ready: bool) -> Self {
        if ready { Self::Ready } else { Self::NotYet }
    }
}

/// Re-runs `check` until it reports ready or `cancel` fires.
///
/// There is no deadline. Returns `false` only when cancelled.
pub async fn poll_until<F, Fut>(
    mut check: F,
    interval: Duration,
    backoff: Duration,
    cancel: &CancellationToken,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Readiness>,
{
    loop {
        if cancel.is_cancelled() {
            return false;
        }

        let wait = match check().await {
            Readiness::Ready => return true,
            Readiness::NotYet => interval,
            Readiness::Backoff => backoff,
        };

        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
