//! Exponential backoff for provider HTTP calls.
//!
//! Rate limits, 5xx responses and network failures are retried. Other client
//! errors fail on the first attempt.

use anyhow::Result;
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let secs = (self.initial_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::REQUEST_TIMEOUT
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Run `send` until it yields a successful response, a non-retryable
/// status, or the attempts run out.
pub async fn with_retry<F, Fut>(policy: &RetryPolicy, provider: &str, send: F) -> Result<Response>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let mut last_error = String::from("no attempt made");

    for attempt in 1..=policy.max_attempts {
        match send().await {
            Ok(response) if response.status().is_success() => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}", provider, attempt);
                }
                return Ok(response);
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !is_retryable_status(status) {
                    anyhow::bail!("{} API error ({}): {}", provider, status, body);
                }
                tracing::warn!(
                    "{} returned {} on attempt {}/{}",
                    provider,
                    status,
                    attempt,
                    policy.max_attempts
                );
                last_error = format!("{} ({}): {}", provider, status, truncate(&body, 200));
            }
            Err(e) => {
                tracing::warn!(
                    "{} network error on attempt {}/{}: {}",
                    provider,
                    attempt,
                    policy.max_attempts,
                    e
                );
                last_error = format!("{}: {}", provider, e);
            }
        }

        if attempt < policy.max_attempts {
            let pause = policy.backoff(attempt) + jitter();
            tracing::debug!("{} retrying in {:.2}s", provider, pause.as_secs_f64());
            tokio::time::sleep(pause).await;
        }
    }

    anyhow::bail!(
        "{} failed after {} attempts: {}",
        provider,
        policy.max_attempts,
        last_error
    )
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// 0-250ms taken from the clock's sub-second noise.
fn jitter() -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    Duration::from_millis((nanos % 250) as u64)
}
