//! The review gate: single authority for opening and deciding reviews.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::notifier::{ApprovalNotifier, StatusSink};
use crate::core::{ReviewId, ReviewItem, ReviewOutcome, ReviewStatus, ReviewTarget, ReviewTargetKind};
use crate::errors::{ConflictError, NotFoundError, OrchestratorError};
use crate::events::{EventSink, PipelineEvent};
use crate::store::ReviewStore;

/// Central review authority shared by every stage service.
///
/// `decide()` is the only operation that touches two aggregates: the
/// review record and the target's status. The two writes happen inside
/// one call, sink first, and the decision is only recorded once the sink
/// has applied it, so an observer awaiting `decide()` always sees the
/// artifact state already updated.
pub struct ReviewGate {
    store: Arc<dyn ReviewStore>,
    notifier: ApprovalNotifier,
    events: Arc<dyn EventSink>,
    /// Serializes concurrent `decide()` calls per review.
    decide_locks: DashMap<ReviewId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for ReviewGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewGate")
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl ReviewGate {
    /// Creates a gate over a review store.
    #[must_use]
    pub fn new(
        store: Arc<dyn ReviewStore>,
        notifier: ApprovalNotifier,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            notifier,
            events,
            decide_locks: DashMap::new(),
        }
    }

    /// Registers the status sink for a target kind.
    pub fn register_sink(&self, kind: ReviewTargetKind, sink: &Arc<dyn StatusSink>) {
        self.notifier.register(kind, sink);
    }

    /// Opens a pending review for a target.
    ///
    /// Returns a conflict when the target already has a pending review.
    pub async fn submit(
        &self,
        target: ReviewTarget,
        summary: impl Into<String> + Send,
    ) -> Result<ReviewId, OrchestratorError> {
        let review = ReviewItem::pending(target, summary);
        let id = review.id;
        self.store
            .insert_review(review)
            .await
            .map_err(OrchestratorError::from_store)?;

        self.events
            .emit(PipelineEvent::ReviewSubmitted { review: id, target })
            .await;
        tracing::debug!(review = %id, target = %target, "review submitted");
        Ok(id)
    }

    /// Records a decision and synchronously propagates it to the target.
    ///
    /// Deciding an already-decided review with the same outcome is an
    /// idempotent success; with the opposite outcome it is a conflict.
    /// If the status sink cannot apply the decision within the notifier's
    /// deadline the decision is not recorded and an error is returned;
    /// the review and its target are never left diverged.
    pub async fn decide(
        &self,
        id: ReviewId,
        outcome: ReviewOutcome,
        feedback: Option<String>,
    ) -> Result<ReviewItem, OrchestratorError> {
        let lock = self
            .decide_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let review = self
            .store
            .review(id)
            .await
            .map_err(OrchestratorError::from_store)?
            .ok_or(NotFoundError::Review(id))?;

        let requested = outcome.as_review_status();
        match review.status {
            ReviewStatus::Pending => {
                self.notifier
                    .notify(review.target, outcome, feedback.as_deref())
                    .await?;

                let decided = self
                    .store
                    .mark_decided(id, requested, feedback, Utc::now())
                    .await
                    .map_err(OrchestratorError::from_store)?;

                self.events
                    .emit(PipelineEvent::ReviewDecided {
                        review: id,
                        target: decided.target,
                        outcome,
                    })
                    .await;
                tracing::info!(review = %id, target = %decided.target, %outcome, "review decided");
                Ok(decided)
            }
            decided if decided == requested => {
                tracing::debug!(review = %id, %outcome, "idempotent re-decision, no side effects");
                Ok(review)
            }
            decided => Err(ConflictError::AlreadyDecided {
                review: id,
                decided,
                requested,
            }
            .into()),
        }
    }

    /// Lists all open review items.
    pub async fn pending(&self) -> Result<Vec<ReviewItem>, OrchestratorError> {
        self.store
            .pending_reviews()
            .await
            .map_err(OrchestratorError::from_store)
    }

    /// Fetches one review item.
    pub async fn get(&self, id: ReviewId) -> Result<ReviewItem, OrchestratorError> {
        self.store
            .review(id)
            .await
            .map_err(OrchestratorError::from_store)?
            .ok_or_else(|| NotFoundError::Review(id).into())
    }
}
