//! Bounded reconnect schedule for networked backends

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// How often and how patiently a backend retries a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Connection attempts before giving up, at least one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// Single attempt, no waiting.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay to wait before attempt number `attempt` (1-based). The first
    /// attempt never waits; later ones double up to `max_backoff`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Runs `connect` until it succeeds or the attempts are spent. Returns
    /// the last error together with the number of attempts made.
    ///
    /// # Errors
    ///
    /// The last connection error once `max_attempts` attempts failed.
    pub async fn retry<T, E, F, Fut>(&self, what: &str, mut connect: F) -> Result<T, (u32, E)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let delay = self.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match connect().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(target: "dblogger", "{what} succeeded on attempt {attempt}");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= attempts => return Err((attempt, e)),
                Err(e) => {
                    warn!(target: "dblogger", "{what} attempt {attempt}/{attempts} failed: {e}");
                    attempt += 1;
                }
            }
        }
    }
}
