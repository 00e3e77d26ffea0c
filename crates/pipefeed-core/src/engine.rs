//! Feed engine
//!
//! [`FeedEngine`] is the entry point collaborators use. It owns, per external
//! project, the two detail caches, the hint ledger and the counters, and
//! exposes:
//! - the classified feed (`list_enriched_page`)
//! - hint recording for actions performed elsewhere
//! - branch and merge-request actions that record their own hints

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::enrich::Enricher;
use crate::error::{FeedError, FeedResult};
use crate::gateway::Gateway;
use crate::hints::{Hint, HintLedger};
use crate::metrics::FeedMetrics;
use crate::model::{
    AcceptOptions, BranchInfo, MergeRequest, NewMergeRequest, PipelineId, PipelineOverview,
};
use crate::pager::{FeedPage, Pager};

/// Branch new work is cut from and promotions end in.
pub const BASE_BRANCH: &str = "main";

/// Prefixes accepted for user-created branches.
pub const BRANCH_PREFIXES: [&str; 3] = ["feature/", "test/", "release/"];

/// Merge statuses that mean the service is still computing mergeability.
const PENDING_MERGE_STATUSES: [&str; 3] = ["checking", "unchecked", "cannot_be_merged_recheck"];

/// Stage of the promotion ladder `feature/* -> test/* -> release/* -> main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStage {
    Feature,
    Test,
    Release,
}

impl BranchStage {
    pub fn source_branch(&self, name: &str) -> String {
        match self {
            BranchStage::Feature => format!("feature/{name}"),
            BranchStage::Test => format!("test/{name}"),
            BranchStage::Release => format!("release/{name}"),
        }
    }

    /// Where this stage promotes to by default.
    pub fn default_target(&self, name: &str) -> String {
        match self {
            BranchStage::Feature => format!("test/{name}"),
            BranchStage::Test => format!("release/{name}"),
            BranchStage::Release => BASE_BRANCH.to_string(),
        }
    }
}

impl FromStr for BranchStage {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feature" => Ok(BranchStage::Feature),
            "test" => Ok(BranchStage::Test),
            "release" => Ok(BranchStage::Release),
            other => Err(FeedError::InvalidInput(format!(
                "invalid source prefix: {other}"
            ))),
        }
    }
}

/// Promote `<stage>/<name>` one step up the ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteRequest {
    pub stage: BranchStage,
    pub name: String,
    /// Explicit target; `None`, empty or `"auto"` use the stage default
    pub target: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub accept: AcceptOptions,
    pub squash: bool,
    pub remove_source_branch: bool,
}

pub struct FeedEngine {
    gateway: Arc<dyn Gateway>,
    enricher: Arc<Enricher>,
    ledger: Arc<HintLedger>,
    metrics: Arc<FeedMetrics>,
    pager: Pager,
    config: EngineConfig,
}

impl FeedEngine {
    /// Engine with a fresh, private hint ledger.
    pub fn new(gateway: Arc<dyn Gateway>, config: EngineConfig) -> FeedResult<Self> {
        let ledger = Arc::new(HintLedger::with_retention(config.hint_retention));
        Self::with_ledger(gateway, config, ledger)
    }

    /// Engine sharing an existing ledger.
    pub fn with_ledger(
        gateway: Arc<dyn Gateway>,
        config: EngineConfig,
        ledger: Arc<HintLedger>,
    ) -> FeedResult<Self> {
        config.validate()?;
        let metrics = Arc::new(FeedMetrics::new());
        let enricher = Arc::new(Enricher::new(
            Arc::clone(&gateway),
            Arc::clone(&metrics),
            config.cache_ttl,
            config.max_concurrency,
            config.display_offset,
        ));
        let pager = Pager::new(
            Arc::clone(&gateway),
            Arc::clone(&enricher),
            Classifier::new(config.create_branch_window, config.display_offset),
            Arc::clone(&ledger),
            Arc::clone(&metrics),
            config.default_per_page,
            config.max_per_page,
        );
        Ok(Self {
            gateway,
            enricher,
            ledger,
            metrics,
            pager,
            config,
        })
    }

    /// Recorded hints, oldest first.
    pub fn hints(&self) -> Vec<Hint> {
        self.ledger.snapshot()
    }

    pub fn metrics(&self) -> &FeedMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Feed
    // -----------------------------------------------------------------------

    /// One enriched, classified page of the pipeline feed (1-based).
    #[instrument(skip(self))]
    pub async fn list_enriched_page(&self, page: u32, per_page: u32) -> FeedResult<FeedPage> {
        self.pager.list_enriched_page(page, per_page).await
    }

    /// A pipeline with its jobs; the pipeline record comes from the cache.
    #[instrument(skip(self))]
    pub async fn pipeline_detail(&self, id: PipelineId) -> FeedResult<PipelineOverview> {
        let detail = self.enricher.pipeline_detail(id).await?;
        let jobs = self.gateway.list_pipeline_jobs(id).await?;
        Ok(PipelineOverview {
            id: detail.id,
            status: detail.status,
            ref_name: detail.ref_name,
            sha: detail.sha,
            jobs,
        })
    }

    pub async fn list_branches(&self) -> FeedResult<Vec<BranchInfo>> {
        Ok(self.gateway.list_branches().await?)
    }

    // -----------------------------------------------------------------------
    // Hints
    // -----------------------------------------------------------------------

    /// Record a fully built hint, e.g. one with an explicit timestamp.
    pub fn record_hint(&self, hint: Hint) {
        self.ledger.record(hint);
        self.metrics.inc_hints_recorded();
    }

    pub fn record_create_branch_hint(&self, branch: &str) {
        self.ledger.record_create_branch(branch);
        self.metrics.inc_hints_recorded();
    }

    pub fn record_merge_hint(&self, branch: &str) {
        self.ledger.record_merge(branch);
        self.metrics.inc_hints_recorded();
    }

    pub fn record_merge_hint_with_details(&self, branch: &str, url: &str, title: &str) {
        self.ledger.record_merge_with_details(branch, url, title);
        self.metrics.inc_hints_recorded();
    }

    pub fn record_merge_from_result(&self, mr: &MergeRequest) {
        self.ledger.record_merge_from_result(mr);
        self.metrics.inc_hints_recorded();
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Create `name` from [`BASE_BRANCH`] and remember it as a create-branch hint.
    #[instrument(skip(self))]
    pub async fn create_branch(&self, name: &str) -> FeedResult<BranchInfo> {
        validate_branch_name(name)?;
        let branch = self.gateway.create_branch(name, BASE_BRANCH).await?;
        self.record_create_branch_hint(name);
        info!(branch = %name, "branch created");
        Ok(branch)
    }

    /// Open a merge request, or return the one already open for the same
    /// source and target.
    ///
    /// A newly opened request is recorded as a merge hint carrying its URL
    /// and title.
    #[instrument(
        skip(self, request),
        fields(source = %request.source_branch, target = %request.target_branch)
    )]
    pub async fn create_merge_request(
        &self,
        request: &NewMergeRequest,
    ) -> FeedResult<MergeRequest> {
        let (mr, created) = self.open_or_reuse(request).await?;
        if created {
            self.record_merge_hint_with_details(&mr.target_branch, &mr.web_url, &request.title);
        }
        Ok(mr)
    }

    /// Accept merge request `iid` once the service agrees it can be merged.
    ///
    /// Checks the request is open, not a draft, conflict-free and has no
    /// unresolved blocking discussions, then waits out an in-progress
    /// mergeability check. If the request cannot be read, acceptance is
    /// attempted anyway and the service has the final word.
    #[instrument(skip(self, options))]
    pub async fn accept_merge_request(
        &self,
        iid: u64,
        options: &AcceptOptions,
    ) -> FeedResult<MergeRequest> {
        match self.gateway.get_merge_request(iid).await {
            Ok(current) => self.ensure_mergeable(current).await?,
            Err(e) => warn!(iid, error = %e, "could not read merge request; accepting blind"),
        }
        let merged = self.gateway.accept_merge_request(iid, options).await?;
        self.record_merge_from_result(&merged);
        info!(
            iid,
            target = %merged.target_branch,
            merge_commit = merged.merge_commit_sha.as_deref().unwrap_or(""),
            "merge request accepted"
        );
        Ok(merged)
    }

    /// Create (or reuse) a merge request and accept it straight away.
    pub async fn auto_merge(
        &self,
        request: &NewMergeRequest,
        options: &AcceptOptions,
    ) -> FeedResult<MergeRequest> {
        let mr = self.create_merge_request(request).await?;
        self.accept_merge_request(mr.iid, options).await
    }

    /// Move `<stage>/<name>` to the next stage through a merge request.
    #[instrument(skip(self, request), fields(stage = ?request.stage, name = %request.name))]
    pub async fn promote(&self, request: &PromoteRequest) -> FeedResult<MergeRequest> {
        if request.name.trim().is_empty() {
            return Err(FeedError::InvalidInput("name required".to_string()));
        }
        let source = request.stage.source_branch(&request.name);
        let target = match request.target.as_deref() {
            None | Some("") | Some("auto") => request.stage.default_target(&request.name),
            Some(explicit) => explicit.to_string(),
        };
        let title = request
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("{source} -> {target}"));

        let new_mr = NewMergeRequest {
            source_branch: source,
            target_branch: target,
            title,
            description: request.description.clone(),
            squash: request.squash,
            remove_source_branch: request.remove_source_branch,
            merge_when_pipeline_succeeds: request.accept.merge_when_pipeline_succeeds,
        };
        let (mr, _) = self.open_or_reuse(&new_mr).await?;
        self.accept_merge_request(mr.iid, &request.accept).await
    }

    async fn open_or_reuse(&self, request: &NewMergeRequest) -> FeedResult<(MergeRequest, bool)> {
        validate_merge_request(request)?;

        match self
            .gateway
            .list_open_merge_requests(&request.source_branch, &request.target_branch)
            .await
        {
            Ok(open) => {
                if let Some(existing) = open.into_iter().next() {
                    info!(iid = existing.iid, "reusing open merge request");
                    return Ok((existing, false));
                }
            }
            Err(e) => warn!(error = %e, "could not list open merge requests"),
        }

        self.ensure_branch(&request.target_branch).await;
        let mr = self.gateway.create_merge_request(request).await?;
        info!(iid = mr.iid, "merge request opened");
        Ok((mr, true))
    }

    /// Create `name` from [`BASE_BRANCH`] if it does not exist. Best effort.
    async fn ensure_branch(&self, name: &str) {
        let exists = match self.gateway.list_branches().await {
            Ok(branches) => branches.iter().any(|b| b.name == name),
            Err(e) => {
                warn!(branch = %name, error = %e, "could not list branches");
                return;
            }
        };
        if exists {
            return;
        }
        if let Err(e) = self.gateway.create_branch(name, BASE_BRANCH).await {
            warn!(branch = %name, error = %e, "could not create target branch");
        }
    }

    async fn ensure_mergeable(&self, mut mr: MergeRequest) -> FeedResult<()> {
        let iid = mr.iid;
        if mr.state != "opened" {
            return Err(FeedError::MergeRequestNotOpen {
                iid,
                state: mr.state,
            });
        }
        if mr.draft {
            return Err(FeedError::MergeRequestDraft(iid));
        }
        if mr.has_conflicts {
            return Err(FeedError::MergeConflicts(iid));
        }
        if !mr.blocking_discussions_resolved {
            return Err(FeedError::UnresolvedDiscussions(iid));
        }

        let deadline = Instant::now() + self.config.merge_status_timeout;
        while PENDING_MERGE_STATUSES.contains(&mr.merge_status.as_str()) {
            if Instant::now() >= deadline {
                return Err(FeedError::NotMergeable {
                    iid,
                    status: mr.merge_status,
                });
            }
            tokio::time::sleep(self.config.merge_status_poll).await;
            match self.gateway.get_merge_request(iid).await {
                Ok(fresh) => {
                    if fresh.has_conflicts {
                        return Err(FeedError::MergeConflicts(iid));
                    }
                    mr = fresh;
                }
                Err(e) => warn!(iid, error = %e, "merge status poll failed"),
            }
        }

        if mr.merge_status != "can_be_merged" {
            return Err(FeedError::NotMergeable {
                iid,
                status: mr.merge_status,
            });
        }
        Ok(())
    }
}

/// Branch names must be `<prefix><something>` for a known prefix.
pub fn validate_branch_name(name: &str) -> FeedResult<()> {
    let valid = BRANCH_PREFIXES
        .iter()
        .any(|prefix| name.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty()));
    if valid {
        Ok(())
    } else {
        Err(FeedError::InvalidBranchName(name.to_string()))
    }
}

fn validate_merge_request(request: &NewMergeRequest) -> FeedResult<()> {
    if request.source_branch.is_empty()
        || request.target_branch.is_empty()
        || request.title.is_empty()
    {
        return Err(FeedError::InvalidInput(
            "source_branch, target_branch and title are required".to_string(),
        ));
    }
    if request.source_branch == request.target_branch {
        return Err(FeedError::InvalidInput(
            "source and target branch must differ".to_string(),
        ));
    }
    Ok(())
}
