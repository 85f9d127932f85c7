use std::{future::Future, time::Duration};

use crate::{api::error::SystemError, constants::Env};

/// Bounded retry with a per-attempt timeout for backend calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
    /// Doubles the delay after each failed attempt when set.
    pub exponential: bool,
}

impl RetryPolicy {
    pub fn backend(env: &Env) -> Self {
        Self {
            attempts: env.backend_max_retries.max(1),
            timeout: Duration::from_secs(env.backend_timeout_secs),
            base_delay: Duration::from_millis(env.backend_retry_delay_ms),
            exponential: true,
        }
    }

    /// Waits for a profile row that a signup trigger has not written yet.
    pub fn profile_ready(env: &Env) -> Self {
        Self {
            attempts: env.profile_ready_retries.max(1),
            timeout: Duration::from_secs(env.backend_timeout_secs),
            base_delay: Duration::from_millis(env.profile_ready_delay_ms),
            exponential: false,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. Each attempt is bounded by `policy.timeout`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &'static str,
    mut op: F,
) -> Result<T, SystemError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SystemError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;

        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(SystemError::Timeout(label)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "{label} failed (attempt {attempt}/{}), retrying in {:?}: {e}",
                    policy.attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_transient() {
                    log::error!("{label} failed after {attempt} attempt(s): {e}");
                }
                return Err(e);
            }
        }
    }
}
