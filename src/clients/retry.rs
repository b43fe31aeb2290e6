use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Bounded exponential backoff around a single logical operation.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Retries after the initial attempt.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 4,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffConfig {
    fn delay_for(&self, attempt: usize) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(u32::try_from(attempt).unwrap_or(u32::MAX))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Run `f` up to `1 + max_retries` times, sleeping between failed attempts.
pub async fn with_backoff<T, E, F, Fut>(config: &BackoffConfig, operation: &str, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries => {
                let delay = config.delay_for(attempt);
                warn!(operation, attempt, error = %e, ?delay, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
