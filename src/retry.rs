use std::cell::Cell;
use std::error::Error as StdError;
use std::thread;
use std::time::Duration;

use backon::{BlockingRetryable, ExponentialBuilder};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(800);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(6);

#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryExhausted<E>
where
    E: StdError + 'static,
{
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub source: E,
}

/// Bounded retry with exponential backoff.
///
/// The delay after the first failure is `initial_backoff`; each further delay
/// doubles, clamped to `max_backoff`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    sleep: fn(Duration),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_INITIAL_BACKOFF,
            DEFAULT_MAX_BACKOFF,
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            sleep: thread::sleep,
        }
    }

    /// Replaces the blocking sleep between attempts.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(2.0)
            .with_max_times(self.max_attempts.max(1) as usize - 1)
    }

    pub fn run<T, E, F>(&self, operation: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        E: StdError + 'static,
        F: FnMut() -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let attempts = Cell::new(0u32);

        let result = (|| {
            attempts.set(attempts.get() + 1);
            op()
        })
        .retry(self.backoff())
        .sleep(self.sleep)
        .notify(|error: &E, delay: Duration| {
            warn!(
                operation,
                attempt = attempts.get(),
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "remote call failed; retrying"
            );
        })
        .call();

        result.map_err(|source| RetryExhausted {
            operation: operation.to_string(),
            attempts: attempts.get(),
            source,
        })
    }
}
