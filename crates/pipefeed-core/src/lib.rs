//! Pipefeed core: enriched, classified CI pipeline feed
//!
//! Turns the external CI service's terse pipeline listing into feed rows
//! that say *why* each pipeline ran.
//!
//! ## Stages
//!
//! 1. List one page of pipelines through a [`Gateway`].
//! 2. Enrich every item concurrently with pipeline and commit detail,
//!    served from short-lived caches.
//! 3. Classify rows as `modify-file`, `create-branch` or `merge` by
//!    correlating them with locally recorded [`Hint`]s.
//!
//! ## Key Components
//!
//! - [`FeedEngine`]: entry point owning caches, hints and counters
//! - [`Gateway`]: capability trait for the external service
//! - [`HintLedger`]: append-only log of user-triggered actions
//! - [`fakes::MemoryGateway`]: scripted in-memory gateway for tests

pub mod cache;
pub mod classify;
pub mod config;
pub mod engine;
pub mod enrich;
mod error;
pub mod fakes;
pub mod format;
pub mod gateway;
pub mod hints;
pub mod metrics;
pub mod model;
pub mod pager;
pub mod telemetry;

pub use classify::{Classifier, ClassifyOutcome};
pub use config::{EngineConfig, HintRetention};
pub use engine::{validate_branch_name, BranchStage, FeedEngine, PromoteRequest, BASE_BRANCH};
pub use enrich::Enricher;
pub use error::{FeedError, FeedResult, GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use hints::{Hint, HintKind, HintLedger};
pub use metrics::{FeedMetrics, MetricsSnapshot};
pub use model::{
    AcceptOptions, BranchInfo, CommitDetail, EnrichedRecord, JobSummary, MergeRequest,
    NewMergeRequest, PageMeta, PipelineDetail, PipelineId, PipelineOverview, PipelineSummary,
    TaskType, UserRef,
};
pub use pager::{FeedPage, Pagination};
pub use telemetry::init_tracing;
