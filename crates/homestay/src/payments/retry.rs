use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::{GatewayError, GatewayKind};

/// Bounded exponential backoff for idempotent reconciliation polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

/// Bound a gateway call by `limit`; elapsed calls surface as [`GatewayError::Timeout`].
pub async fn call_with_timeout<T, F>(
    gateway: GatewayKind,
    limit: Duration,
    call: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout {
            gateway,
            after: limit,
        }),
    }
}

/// Retry a read-only gateway operation. Never use for state-changing calls.
pub async fn retry_idempotent<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 1;
    let mut delay = policy.initial_backoff;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts.max(1) => {
                warn!(attempt, ?delay, %error, "gateway poll failed; backing off");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max_backoff);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
