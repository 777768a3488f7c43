//! Exponential backoff with jitter.
//!
//! Used wherever the engine retries work whose failure may be transient: compare-and-swap conflicts in the ledgers,
//! settlement of gateway events and delivery of events to hooks.
use std::{fmt::Display, future::Future, time::Duration};

use log::*;
use rand::Rng;
use tokio::time::sleep;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// The total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    pub multiplier: f64,
    /// When true, each delay is drawn uniformly from the upper half of the backoff window.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Fails on the first error.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// The delay to wait after the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let secs = if self.jitter && capped > 0.0 { rand::thread_rng().gen_range(capped / 2.0..=capped) } else { capped };
        Duration::from_secs_f64(secs)
    }
}

/// Runs `operation` until it succeeds, `should_retry` rejects the error, or `config.max_attempts` is reached.
///
/// The closure receives the 1-based attempt number. The last error is returned on failure.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    label: &str,
    should_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("🔁️ {label} succeeded on attempt {attempt}");
                }
                return Ok(result);
            },
            Err(e) if !should_retry(&e) => {
                trace!("🔁️ {label} failed with a permanent error: {e}");
                return Err(e);
            },
            Err(e) if attempt >= config.max_attempts => {
                warn!("🔁️ {label} failed after {attempt} attempts. Giving up. Last error: {e}");
                return Err(e);
            },
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                debug!("🔁️ {label} failed on attempt {attempt}: {e}. Retrying in {}ms", delay.as_millis());
                sleep(delay).await;
            },
        }
    }
}
