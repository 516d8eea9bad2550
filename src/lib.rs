//! # Gateflow
//!
//! Orchestration core for a review-gated, five-stage content-generation
//! pipeline: Requirements → Planning → Stories → Prompts → Code.
//!
//! Each stage turns approved upstream content into a generated artifact;
//! every artifact (and every user story) must be explicitly approved by a
//! human reviewer before anything downstream may start. The crate owns the
//! state machine, the review gate, and the gateway resilience layer:
//!
//! - **Stage services**: one generic lifecycle with five pluggable stage
//!   behaviors, guarded by a per-upstream uniqueness slot
//! - **Review gate**: single authority for opening and deciding reviews,
//!   with synchronous decision propagation
//! - **Dependency validator**: equality-only status checks over the fixed
//!   stage chain
//! - **Generation gateway**: provider-agnostic trait with retry, circuit
//!   breaker, and an optional HTTP client behind the `http-gateway`
//!   feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gateflow::prelude::*;
//! use std::sync::Arc;
//!
//! let pipeline = Pipeline::builder(Arc::new(my_gateway))
//!     .with_config(PipelineConfig::default())
//!     .build();
//!
//! let project = pipeline.create_project("todo app", "a simple todo app").await?;
//! let artifact = pipeline
//!     .generate(
//!         StageType::Requirements,
//!         UpstreamRef::project(project.id),
//!         GenerateInput::new("build a todo app"),
//!     )
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod observability;
pub mod pipeline;
pub mod review;
pub mod stage;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{PipelineConfig, ReviewPolicy};
    pub use crate::core::{
        ArtifactId, ArtifactStatus, ArtifactToken, Project, ProjectId, ReviewId, ReviewItem,
        ReviewOutcome, ReviewStatus, ReviewTarget, StageArtifact, StageType, StoryId, UpstreamRef,
        UserStory,
    };
    pub use crate::errors::{
        ConflictError, DependencyError, NotFoundError, OrchestratorError, ValidationError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::gateway::{
        BreakerConfig, CircuitBreaker, GatewayError, GeneratedText, GenerationGateway,
        GenerationRequest, RetryPolicy, RetryingGateway,
    };
    pub use crate::pipeline::{Pipeline, PipelineBuilder};
    pub use crate::review::{ReviewGate, StatusSink};
    pub use crate::stage::{DependencyValidator, GenerateInput, StageBehavior, StageService};
    pub use crate::store::{MemoryStore, PipelineStore};

    #[cfg(feature = "http-gateway")]
    pub use crate::gateway::{HttpGateway, HttpGatewayConfig};
}
