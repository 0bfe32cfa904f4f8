//! Retry logic with exponential backoff

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::Result;

/// Retry policy for outbound agent requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff delay (doubles per retry)
    pub initial_delay: Duration,
    /// Upper bound on a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy from the agent config fields.
    #[must_use]
    pub fn new(max_retries: u32, initial_delay_seconds: f64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_secs_f64(initial_delay_seconds.max(0.001)),
            max_delay: Duration::from_secs(30),
        }
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
            .build()
    }
}

/// Execute a future with retry on retryable errors.
///
/// Non-retryable errors (anything that is an answer rather than a transport
/// fault) are returned immediately.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, name: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delays = policy.delays();
    let mut attempt = 1u32;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }
                let Some(delay) = delays.next() else {
                    warn!(operation = name, attempts = attempt, error = %e, "Retries exhausted");
                    return Err(e);
                };
                debug!(
                    operation = name,
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Retrying after backoff"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
