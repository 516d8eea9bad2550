//! Approval notifier: the synchronous bridge between a review decision
//! and the owning artifact's status.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::core::{ReviewOutcome, ReviewTarget, ReviewTargetKind};
use crate::errors::{NotifyError, OrchestratorError};

/// Applies a review decision to the entity that owns the review.
///
/// Implementations must be idempotent: replaying a decision whose outcome
/// the target already reflects is a successful no-op. This is what makes
/// `decide()` retries safe.
#[async_trait]
pub trait StatusSink: Send + Sync + std::fmt::Debug {
    /// Propagates a decision to the target entity.
    async fn apply_decision(
        &self,
        target_id: Uuid,
        outcome: ReviewOutcome,
        feedback: Option<&str>,
    ) -> Result<(), OrchestratorError>;
}

/// Routes decisions to the sink registered for each target kind.
///
/// Sinks are registered once at composition time, so the fan-out is
/// statically known. They are held weakly: the pipeline owns the strong
/// references, and a dropped pipeline must not be kept alive by its gate.
#[derive(Debug)]
pub struct ApprovalNotifier {
    sinks: RwLock<HashMap<ReviewTargetKind, Weak<dyn StatusSink>>>,
    deadline: Duration,
    retry_pause: Duration,
}

impl ApprovalNotifier {
    /// Creates a notifier with the given propagation deadline.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self {
            sinks: RwLock::new(HashMap::new()),
            deadline,
            retry_pause: Duration::from_millis(25),
        }
    }

    /// Registers the sink for a target kind, replacing any previous one.
    pub fn register(&self, kind: ReviewTargetKind, sink: &Arc<dyn StatusSink>) {
        self.sinks.write().insert(kind, Arc::downgrade(sink));
    }

    /// Returns the number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Drives a decision into the owning sink, retrying until it applies
    /// or the deadline passes.
    ///
    /// On deadline the caller must treat the decision as not taken; the
    /// review is left pending so state never diverges.
    pub async fn notify(
        &self,
        target: ReviewTarget,
        outcome: ReviewOutcome,
        feedback: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        let sink = self
            .sinks
            .read()
            .get(&target.kind)
            .and_then(Weak::upgrade)
            .ok_or(NotifyError::NoSink { target })?;

        let started = Instant::now();
        let mut pause = self.retry_pause;
        loop {
            match sink.apply_decision(target.id, outcome, feedback).await {
                Ok(()) => return Ok(()),
                // A conflict means the target cannot take this decision at
                // all (wrong state, flipped outcome); retrying won't help.
                Err(err @ OrchestratorError::Conflict(_)) => return Err(err),
                Err(err) => {
                    if started.elapsed() >= self.deadline {
                        return Err(NotifyError::DeadlineExceeded {
                            target,
                            deadline_ms: self.deadline.as_millis() as u64,
                            reason: err.to_string(),
                        }
                        .into());
                    }
                    tracing::warn!(
                        target = %target,
                        error = %err,
                        "status sink failed, retrying within decide deadline"
                    );
                    tokio::time::sleep(pause).await;
                    pause = (pause * 2).min(Duration::from_millis(250));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactId, StageType};
    use crate::errors::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FlakySink {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl StatusSink for FlakySink {
        async fn apply_decision(
            &self,
            _target_id: Uuid,
            _outcome: ReviewOutcome,
            _feedback: Option<&str>,
        ) -> Result<(), OrchestratorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(OrchestratorError::Store(StoreError::Backend(
                    "transient".into(),
                )))
            } else {
                Ok(())
            }
        }
    }

    fn artifact_target() -> ReviewTarget {
        ReviewTarget::artifact(StageType::Requirements, ArtifactId::new())
    }

    #[tokio::test]
    async fn test_notify_reaches_registered_sink() {
        let notifier = ApprovalNotifier::new(Duration::from_millis(500));
        let sink: Arc<dyn StatusSink> = Arc::new(FlakySink::default());
        let target = artifact_target();
        notifier.register(target.kind, &sink);

        notifier
            .notify(target, ReviewOutcome::Approve, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_notify_retries_transient_sink_failures() {
        let notifier = ApprovalNotifier::new(Duration::from_secs(2));
        let flaky = Arc::new(FlakySink {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let sink: Arc<dyn StatusSink> = flaky.clone();
        let target = artifact_target();
        notifier.register(target.kind, &sink);

        notifier
            .notify(target, ReviewOutcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_notify_fails_past_deadline() {
        let notifier = ApprovalNotifier::new(Duration::from_millis(50));
        let sink: Arc<dyn StatusSink> = Arc::new(FlakySink {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        });
        let target = artifact_target();
        notifier.register(target.kind, &sink);

        let err = notifier
            .notify(target, ReviewOutcome::Reject, Some("too vague"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Notify(NotifyError::DeadlineExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_notify_without_sink_errors() {
        let notifier = ApprovalNotifier::new(Duration::from_millis(50));
        let err = notifier
            .notify(artifact_target(), ReviewOutcome::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Notify(NotifyError::NoSink { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_sink_is_gone() {
        let notifier = ApprovalNotifier::new(Duration::from_millis(50));
        let target = artifact_target();
        {
            let sink: Arc<dyn StatusSink> = Arc::new(FlakySink::default());
            notifier.register(target.kind, &sink);
        }
        let err = notifier
            .notify(target, ReviewOutcome::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Notify(NotifyError::NoSink { .. })
        ));
    }
}
