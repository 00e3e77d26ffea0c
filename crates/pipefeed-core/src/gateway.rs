//! External source gateway
//!
//! The engine never talks to the CI service directly. Everything it needs
//! from one project goes through the [`Gateway`] capability:
//! - pipeline listing (paginated, newest first) and pipeline detail
//! - commits by SHA
//! - branches and merge requests
//!
//! Implementations own transport and authentication. An in-memory fake is
//! provided for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::model::{
    AcceptOptions, BranchInfo, CommitDetail, JobSummary, MergeRequest, NewMergeRequest, PageMeta,
    PipelineDetail, PipelineId, PipelineSummary,
};

/// Capability to read and mutate one project in the external CI service.
///
/// Guarantees expected from implementations:
/// - `list_pipelines` returns items newest first, and `PageMeta` describes
///   the page actually returned.
/// - Read calls are idempotent; repeating them has no side effects.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// One page of pipeline summaries plus pagination metadata.
    async fn list_pipelines(
        &self,
        page: u32,
        per_page: u32,
    ) -> GatewayResult<(Vec<PipelineSummary>, PageMeta)>;

    /// Full pipeline record.
    async fn get_pipeline(&self, id: PipelineId) -> GatewayResult<PipelineDetail>;

    /// Jobs of one pipeline.
    async fn list_pipeline_jobs(&self, id: PipelineId) -> GatewayResult<Vec<JobSummary>>;

    /// Commit metadata by SHA.
    async fn get_commit(&self, sha: &str) -> GatewayResult<CommitDetail>;

    async fn list_branches(&self) -> GatewayResult<Vec<BranchInfo>>;

    /// Create `name` pointing at `from_ref`.
    async fn create_branch(&self, name: &str, from_ref: &str) -> GatewayResult<BranchInfo>;

    /// Open merge requests from `source` into `target`.
    async fn list_open_merge_requests(
        &self,
        source: &str,
        target: &str,
    ) -> GatewayResult<Vec<MergeRequest>>;

    async fn create_merge_request(&self, request: &NewMergeRequest) -> GatewayResult<MergeRequest>;

    async fn get_merge_request(&self, iid: u64) -> GatewayResult<MergeRequest>;

    async fn accept_merge_request(
        &self,
        iid: u64,
        options: &AcceptOptions,
    ) -> GatewayResult<MergeRequest>;
}
