//! services/journal/src/sync/retry.rs
//!
//! Retry policy applied to persistence calls before an optimistic change is
//! rolled back. Only transient failures are retried.

use std::future::Future;
use std::time::Duration;

use booktalk_core::ports::PortResult;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl Default for RetryPolicy {
    /// A single attempt: failures roll back immediately.
    fn default() -> Self {
        Self::new(1, Duration::from_millis(200))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    pub fn no_retry() -> Self {
        Self::default()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Runs `attempt` until it succeeds, fails permanently, or attempts run out.
    /// The backoff doubles after every transient failure.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> PortResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        let mut tries = 1;
        let mut backoff = self.initial_backoff;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && tries < self.max_attempts => {
                    warn!(
                        operation,
                        attempt = tries,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Persistence failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    tries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
