//! Test support: a scriptable in-process generation gateway.
//!
//! The scripted gateway answers calls from a queue of canned results, so
//! tests can drive failure sequences (rate limits, outages, bad bodies)
//! without a provider. It lives in the public surface because downstream
//! crates embedding the pipeline want the same harness for their own
//! tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::gateway::{GatewayError, GeneratedText, GenerationGateway, GenerationRequest};

/// Gateway that replays a queue of scripted results.
///
/// When the queue is empty every call succeeds with a placeholder body,
/// so happy-path tests need no setup at all.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<GeneratedText, GatewayError>>>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedGateway {
    /// Creates a gateway with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn push_ok(&self, content: impl Into<String>) {
        self.script
            .lock()
            .push_back(Ok(GeneratedText::new(content)));
    }

    /// Queues a failure.
    pub fn push_err(&self, err: GatewayError) {
        self.script.lock().push_back(Err(err));
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The prompt of the most recent call.
    #[must_use]
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedText, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(request.prompt);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(GeneratedText::new("scripted output")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_results_replay_in_order() {
        let gateway = ScriptedGateway::new();
        gateway.push_ok("first");
        gateway.push_err(GatewayError::Timeout { elapsed_ms: 10 });

        let first = gateway
            .generate(GenerationRequest::new("a"))
            .await
            .unwrap();
        assert_eq!(first.content, "first");

        let second = gateway.generate(GenerationRequest::new("b")).await;
        assert!(matches!(second, Err(GatewayError::Timeout { .. })));
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_script_defaults_to_success() {
        let gateway = ScriptedGateway::new();
        let out = gateway
            .generate(GenerationRequest::new("anything"))
            .await
            .unwrap();
        assert_eq!(out.content, "scripted output");
        assert_eq!(gateway.last_prompt().as_deref(), Some("anything"));
    }
}
