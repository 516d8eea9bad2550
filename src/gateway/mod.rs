//! Generation gateway: the external capability that turns a prompt into
//! generated text.
//!
//! The core never talks to a provider directly. Resilience concerns
//! (retry, circuit breaking, model fallback) are centralized in decorators
//! composed once at pipeline build time and shared by every stage service.

mod breaker;
mod retry;

#[cfg(feature = "http-gateway")]
mod http;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use retry::{RetryPolicy, RetryingGateway};

#[cfg(feature = "http-gateway")]
pub use http::{HttpGateway, HttpGatewayConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The prompt to expand.
    pub prompt: String,
    /// Optional context prepended to the prompt (system instructions).
    pub context: Option<String>,
    /// Preferred models, tried in order by fallback-aware decorators.
    pub model_hints: Vec<String>,
    /// Budget for the whole call; a provider exceeding it is a `Timeout`.
    pub timeout: Duration,
}

impl GenerationRequest {
    /// Creates a request with the given prompt and a default timeout.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: None,
            model_hints: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Sets the system context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Sets the model hints.
    #[must_use]
    pub fn with_model_hints(mut self, hints: Vec<String>) -> Self {
        self.model_hints = hints;
        self
    }

    /// Sets the timeout budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Successful gateway output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedText {
    /// The generated content.
    pub content: String,
    /// The model that produced it, when reported.
    pub model: Option<String>,
    /// Provider latency, when measured.
    pub latency_ms: Option<f64>,
}

impl GeneratedText {
    /// Creates a response carrying only content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            latency_ms: None,
        }
    }
}

/// Typed gateway failures.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The call exceeded its timeout budget. Terminal for the artifact.
    #[error("generation timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed time when the budget ran out.
        elapsed_ms: u64,
    },

    /// The provider rate-limited the call. Retryable.
    #[error("provider rate limited{}", retry_after.map(|d| format!(", retry after {}ms", d.as_millis())).unwrap_or_default())]
    RateLimited {
        /// Provider-suggested wait, when supplied.
        retry_after: Option<Duration>,
    },

    /// The provider is unreachable or returned a server error. Retryable.
    #[error("provider unavailable: {reason}")]
    ProviderUnavailable {
        /// What went wrong.
        reason: String,
    },

    /// The provider answered with something unusable. Terminal.
    #[error("invalid provider response: {reason}")]
    InvalidResponse {
        /// What was wrong with the response.
        reason: String,
    },
}

impl GatewayError {
    /// Returns true if a bounded retry may succeed.
    ///
    /// `Timeout` and `InvalidResponse` are surfaced as a terminal failed
    /// artifact rather than retried indefinitely.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ProviderUnavailable { .. })
    }
}

/// External capability that turns a prompt into generated text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Generates text for the request, or a typed failure.
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedText, GatewayError>;
}
