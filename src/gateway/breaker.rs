//! Circuit breaker decorator for the generation gateway.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{GeneratedText, GenerationGateway, GenerationRequest, GatewayError};
use async_trait::async_trait;

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a probe call.
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Decorator that fast-fails while the provider is known to be down.
///
/// Consecutive retryable failures open the circuit; while open, calls
/// return `ProviderUnavailable` without touching the provider. After the
/// cooldown a single probe call is let through; success closes the
/// circuit, failure re-opens it.
pub struct CircuitBreaker {
    inner: Arc<dyn GenerationGateway>,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Wraps a gateway with the given thresholds.
    #[must_use]
    pub fn new(inner: Arc<dyn GenerationGateway>, config: BreakerConfig) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    /// Returns true while the circuit is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), BreakerState::Open { .. })
    }

    /// Decides whether a call may proceed, transitioning Open -> HalfOpen
    /// once the cooldown has elapsed.
    fn admit(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => true,
            BreakerState::Open { since } => {
                if since.elapsed() >= Duration::from_millis(self.config.cooldown_ms) {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        *self.state.lock() = BreakerState::Closed { failures: 0 };
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        *state = match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    tracing::warn!(failures, "circuit breaker opened");
                    BreakerState::Open {
                        since: Instant::now(),
                    }
                } else {
                    BreakerState::Closed { failures }
                }
            }
            BreakerState::HalfOpen | BreakerState::Open { .. } => BreakerState::Open {
                since: Instant::now(),
            },
        };
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerationGateway for CircuitBreaker {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedText, GatewayError> {
        if !self.admit() {
            return Err(GatewayError::ProviderUnavailable {
                reason: "circuit open".into(),
            });
        }

        match self.inner.generate(request).await {
            Ok(output) => {
                self.record_success();
                Ok(output)
            }
            Err(err) => {
                // Only provider-side trouble trips the breaker; a bad
                // response body says nothing about availability.
                if err.is_retryable() {
                    self.record_failure();
                }
                Err(err)
            }
        }
    }
}
