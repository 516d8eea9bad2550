//! Bounded retry with backoff for transient gateway failures.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{GeneratedText, GenerationGateway, GenerationRequest, GatewayError};
use async_trait::async_trait;

/// Configuration for gateway retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the initial call.
    pub max_attempts: usize,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Apply full jitter (random delay in `0..=computed`).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 15_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Disables jitter; delays become deterministic.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Computes the delay before retry number `attempt` (1-indexed).
    ///
    /// Exponential backoff capped at `max_delay_ms`; a provider-supplied
    /// `retry_after` overrides the computed delay but still honors the cap.
    #[must_use]
    pub fn delay_for(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);
        if let Some(hinted) = retry_after {
            return hinted.min(cap);
        }

        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let computed = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);

        let millis = if self.jitter && computed > 0 {
            rand::thread_rng().gen_range(0..=computed)
        } else {
            computed
        };
        Duration::from_millis(millis)
    }
}

/// Decorator adding bounded retry and model fallback to any gateway.
///
/// Retryable errors (`RateLimited`, `ProviderUnavailable`) are retried up
/// to the policy's attempt budget; terminal errors (`Timeout`,
/// `InvalidResponse`) are surfaced immediately. When the request carries
/// more than one model hint, each `ProviderUnavailable` advances to the
/// next hint before retrying.
pub struct RetryingGateway {
    inner: Arc<dyn GenerationGateway>,
    policy: RetryPolicy,
}

impl RetryingGateway {
    /// Wraps a gateway with the given policy.
    #[must_use]
    pub fn new(inner: Arc<dyn GenerationGateway>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl std::fmt::Debug for RetryingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingGateway")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerationGateway for RetryingGateway {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedText, GatewayError> {
        let mut attempt = 1usize;
        let mut hint_offset = 0usize;

        loop {
            let mut current = request.clone();
            if hint_offset > 0 && hint_offset < request.model_hints.len() {
                current.model_hints = request.model_hints[hint_offset..].to_vec();
            }

            match self.inner.generate(current).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let retry_after = match &err {
                        GatewayError::RateLimited { retry_after } => *retry_after,
                        GatewayError::ProviderUnavailable { .. } => {
                            if request.model_hints.len() > hint_offset + 1 {
                                hint_offset += 1;
                            }
                            None
                        }
                        _ => None,
                    };

                    let delay = self.policy.delay_for(attempt, retry_after);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying generation after transient gateway error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
