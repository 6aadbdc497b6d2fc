//! Unbounded exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{CronError, CronResult};

/// Retries an operation with exponentially increasing delays.
///
/// The delay starts at `initial`, doubles after every unsuccessful attempt
/// and is capped at `max`. There is no attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffHelper {
    initial: Duration,
    max: Duration,
}

impl BackoffHelper {
    /// Smallest delay between attempts.
    pub const MIN_DELAY: Duration = Duration::from_millis(1);

    /// Create a helper. `initial` is at least [`MIN_DELAY`](Self::MIN_DELAY)
    /// and `max` is raised to `initial` if it is smaller.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Self::MIN_DELAY);
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Initial delay.
    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Maximum delay.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay to use after a sleep of `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }

    /// Invoke `op` until it returns `true`, sleeping between attempts.
    ///
    /// Returns [`CronError::Cancelled`] if `cancel` fires, either before an
    /// attempt or during a sleep. A cancelled sleep never leads to another
    /// attempt.
    pub async fn do_until_success<F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> CronResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut delay = self.initial;

        loop {
            if cancel.is_cancelled() {
                return Err(CronError::Cancelled);
            }

            if op().await {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CronError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            delay = self.next_delay(delay);
        }
    }
}
