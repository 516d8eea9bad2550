//! HTTP gateway for OpenAI-compatible chat-completions providers.
//!
//! Implements the usual proxy contract for such providers: bearer-key
//! auth against a configurable base URL, `POST {base}/chat/completions`,
//! HTTP 429 mapped to `RateLimited` (honoring `Retry-After`), 5xx mapped
//! to `ProviderUnavailable`, and anything unparseable to `InvalidResponse`.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{GeneratedText, GenerationGateway, GenerationRequest, GatewayError};
use async_trait::async_trait;

/// Connection settings for an OpenAI-compatible provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGatewayConfig {
    /// Base URL, e.g. `https://nano-gpt.com/api/v1`.
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Model used when a request carries no hints.
    pub default_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Reqwest-backed generation gateway.
pub struct HttpGateway {
    client: reqwest::Client,
    config: HttpGatewayConfig,
}

impl HttpGateway {
    /// Creates a gateway from connection settings.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| GatewayError::ProviderUnavailable {
                reason: format!("client construction: {err}"),
            })?;
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)?
            .to_str()
            .ok()?
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.config.base_url)
            .field("default_model", &self.config.default_model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerationGateway for HttpGateway {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedText, GatewayError> {
        let model = request
            .model_hints
            .first()
            .map_or(self.config.default_model.as_str(), String::as_str);

        let mut messages = Vec::with_capacity(2);
        if let Some(context) = request.context.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: context,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model,
            messages,
            stream: false,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GatewayError::Timeout {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                } else {
                    GatewayError::ProviderUnavailable {
                        reason: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited {
                retry_after: Self::parse_retry_after(&response),
            });
        }
        if status.is_server_error() {
            return Err(GatewayError::ProviderUnavailable {
                reason: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::InvalidResponse {
                reason: format!("HTTP {status}"),
            });
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|err| GatewayError::InvalidResponse {
                    reason: format!("body parse: {err}"),
                })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse {
                reason: "no completion content".into(),
            })?;

        Ok(GeneratedText {
            content,
            model: parsed.model,
            latency_ms: Some(latency_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_strips_trailing_slash() {
        let gateway = HttpGateway::new(HttpGatewayConfig {
            base_url: "https://example.test/api/v1/".into(),
            api_key: "key".into(),
            default_model: "model-a".into(),
        })
        .unwrap();
        assert_eq!(
            gateway.completions_url(),
            "https://example.test/api/v1/chat/completions"
        );
    }
}
