//! Event Ingestor and Indicator Ingestor support: thin `reqwest` clients
//! with register-backed rate limiting and bounded retry, grounded in the
//! same scraper shape used elsewhere in this codebase (a struct holding
//! the HTTP client plus a rate limiter, an `execute_with_retry` helper
//! around each call).

pub mod events;
pub mod indicators;

use crate::error::PipelineError;
use crate::register::Register;
use std::time::Duration;
use tokio::time::sleep;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// Enforces a minimum inter-request gap against a shared register key.
/// Safe across processes when the register is Redis-backed; advisory
/// only under the in-memory fallback.
pub struct RateLimiter {
    register: Register,
    key: String,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(register: Register, key: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            register,
            key: key.into(),
            min_interval,
        }
    }

    /// Block until at least `min_interval` has passed since the last call
    /// under this key, then record `now`.
    pub async fn acquire(&self) -> anyhow::Result<()> {
        if let Some(last_call) = self.register.get(&self.key).await? {
            let elapsed = chrono::Utc::now().signed_duration_since(last_call);
            let elapsed = elapsed.to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        self.register.set(&self.key, chrono::Utc::now()).await?;
        Ok(())
    }
}

/// Run `call` with exponential backoff retry. A 429 gets a fixed 60s
/// backoff regardless of attempt count, matching the rate-limited-upstream
/// case the other scraper in this codebase special-cases the same way.
/// Exhausted retries classify as `PipelineError::UpstreamTransient` so
/// callers can fold them into the coordinator's advance-or-not decision.
pub async fn execute_with_retry<T, F, Fut>(mut call: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RetryableError>>,
{
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(RetryableError::RateLimited) => {
                attempt += 1;
                if attempt > MAX_RETRIES {
                    return Err(PipelineError::UpstreamTransient(anyhow::anyhow!(
                        "rate limited after {MAX_RETRIES} retries"
                    )));
                }
                sleep(Duration::from_secs(60)).await;
            }
            Err(RetryableError::Transient(e)) => {
                attempt += 1;
                if attempt > MAX_RETRIES {
                    return Err(PipelineError::UpstreamTransient(
                        e.context(format!("exhausted {MAX_RETRIES} retries")),
                    ));
                }
                sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
        }
    }
}

pub enum RetryableError {
    RateLimited,
    Transient(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, PipelineError> = execute_with_retry(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RetryableError::Transient(anyhow::anyhow!("boom")))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rate_limiter_enforces_minimum_gap() {
        let register = Register::connect(None).await.unwrap();
        let limiter = RateLimiter::new(register, "rate:test", Duration::from_millis(50));
        let start = std::time::Instant::now();
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
