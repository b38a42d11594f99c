//! Bounded retries with linear backoff for time service requests.

use crate::error::SyncError;
use crate::time::DeviceClock;
use std::time::Duration;
use tracing::warn;

/// `attempts` tries in total; after failed attempt `n` the caller waits
/// `n * backoff_step` before trying again. There is no wait after the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_step: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff_step: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff_step,
        }
    }

    /// The pause that follows failed attempt number `attempt` (1-based).
    pub fn wait_after(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    /// Runs `request` until it succeeds or the attempts are used up.
    ///
    /// Pauses go through `clock` so a simulated clock can absorb them.
    /// Returns the last error when every attempt failed.
    pub fn run<T>(
        &self,
        clock: &dyn DeviceClock,
        what: &str,
        mut request: impl FnMut() -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let mut attempt = 1;
        loop {
            match request() {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.attempts => return Err(err),
                Err(err) => {
                    let wait = self.wait_after(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Waiting {:?} to retry.",
                        what, attempt, self.attempts, err, wait
                    );
                    clock.sleep(wait);
                    attempt += 1;
                }
            }
        }
    }
}
