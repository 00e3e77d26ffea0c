//! In-memory fake for the [`Gateway`] trait (testing only)
//!
//! `MemoryGateway` holds a scripted project: a pipeline listing, details,
//! commits, branches and merge requests. On top of that it can:
//! - fail the listing, individual pipelines or individual commits
//! - delay detail fetches and record the peak number in flight
//! - count calls per operation
//! - script successive `merge_status` values for polling

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;
use crate::model::{
    AcceptOptions, BranchInfo, CommitDetail, JobSummary, MergeRequest, NewMergeRequest, PageMeta,
    PipelineDetail, PipelineId, PipelineSummary,
};

#[derive(Debug, Default)]
struct ProjectState {
    listing: Vec<PipelineSummary>,
    details: HashMap<PipelineId, PipelineDetail>,
    jobs: HashMap<PipelineId, Vec<JobSummary>>,
    commits: HashMap<String, CommitDetail>,
    branches: Vec<BranchInfo>,
    merge_requests: Vec<MergeRequest>,
    merge_status_script: HashMap<u64, VecDeque<String>>,
    next_iid: u64,

    listing_error: Option<GatewayError>,
    failing_pipelines: HashSet<PipelineId>,
    failing_commits: HashSet<String>,
    failing_merge_request_reads: bool,
}

/// Scripted single-project gateway.
#[derive(Debug)]
pub struct MemoryGateway {
    state: Mutex<ProjectState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight gauge when a delayed fetch finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryGateway {
    /// Empty project with a `main` branch.
    pub fn new() -> Self {
        let state = ProjectState {
            branches: vec![BranchInfo {
                name: "main".to_string(),
                commit_sha: "0000000".to_string(),
                protected: true,
            }],
            next_iid: 1,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            calls: Mutex::new(HashMap::new()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    // -- scripting ---------------------------------------------------------

    /// Delay every pipeline and commit fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Append a pipeline to the listing with a detail record created at
    /// `created_at` and a matching commit when `sha` is non-empty.
    pub fn with_pipeline(
        self,
        id: PipelineId,
        branch: &str,
        sha: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        let summary = PipelineSummary {
            id,
            status: "success".to_string(),
            ref_name: branch.to_string(),
            sha: sha.to_string(),
            web_url: format!("https://ci.example.test/pipelines/{id}"),
        };
        let detail = PipelineDetail {
            id,
            status: "success".to_string(),
            ref_name: branch.to_string(),
            sha: sha.to_string(),
            created_at: Some(created_at),
            updated_at: None,
            duration: Some(60),
            user: None,
        };
        let with_detail = self.with_pipeline_parts(summary, detail);
        if sha.is_empty() {
            with_detail
        } else {
            with_detail.with_commit(sha, &format!("commit {sha}"), "ci-bot")
        }
    }

    /// Append a listing row and its detail record as given.
    pub fn with_pipeline_parts(self, summary: PipelineSummary, detail: PipelineDetail) -> Self {
        {
            let mut state = self.state();
            state.details.insert(detail.id, detail);
            state.listing.push(summary);
        }
        self
    }

    /// Append a listing row with no detail record behind it.
    pub fn with_listing_row(self, summary: PipelineSummary) -> Self {
        self.state().listing.push(summary);
        self
    }

    pub fn with_commit(self, sha: &str, title: &str, author: &str) -> Self {
        self.state().commits.insert(
            sha.to_string(),
            CommitDetail {
                sha: sha.to_string(),
                title: title.to_string(),
                message: format!("{title}\n"),
                author_name: author.to_string(),
            },
        );
        self
    }

    pub fn with_jobs(self, id: PipelineId, jobs: Vec<JobSummary>) -> Self {
        self.state().jobs.insert(id, jobs);
        self
    }

    pub fn with_branch(self, name: &str) -> Self {
        self.state().branches.push(BranchInfo {
            name: name.to_string(),
            commit_sha: String::new(),
            protected: false,
        });
        self
    }

    /// Insert a merge request as-is. Its `iid` must be unique.
    pub fn with_merge_request(self, mr: MergeRequest) -> Self {
        {
            let mut state = self.state();
            state.next_iid = state.next_iid.max(mr.iid + 1);
            state.merge_requests.push(mr);
        }
        self
    }

    /// Successive `merge_status` values returned by `get_merge_request(iid)`.
    /// The last value sticks once the script runs out.
    pub fn with_merge_status_script(self, iid: u64, statuses: &[&str]) -> Self {
        self.state().merge_status_script.insert(
            iid,
            statuses.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn fail_listing(self, error: GatewayError) -> Self {
        self.state().listing_error = Some(error);
        self
    }

    pub fn fail_pipeline(self, id: PipelineId) -> Self {
        self.state().failing_pipelines.insert(id);
        self
    }

    pub fn fail_commit(self, sha: &str) -> Self {
        self.state().failing_commits.insert(sha.to_string());
        self
    }

    pub fn fail_merge_request_reads(self) -> Self {
        self.state().failing_merge_request_reads = true;
        self
    }

    // -- inspection --------------------------------------------------------

    /// Number of calls made to `op` (the trait method name).
    pub fn calls(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of delayed fetches observed at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn merge_request(&self, iid: u64) -> Option<MergeRequest> {
        self.state()
            .merge_requests
            .iter()
            .find(|mr| mr.iid == iid)
            .cloned()
    }

    pub fn branch_names(&self) -> Vec<String> {
        self.state().branches.iter().map(|b| b.name.clone()).collect()
    }

    // -- internals ---------------------------------------------------------

    fn state(&self) -> MutexGuard<'_, ProjectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, op: &'static str) {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_insert(0) += 1;
    }

    async fn simulate_latency(&self) {
        let Some(latency) = self.latency else {
            return;
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(latency).await;
    }
}

fn server_error(what: String) -> GatewayError {
    GatewayError::Http {
        status: 500,
        body: format!("injected failure: {what}"),
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn list_pipelines(
        &self,
        page: u32,
        per_page: u32,
    ) -> GatewayResult<(Vec<PipelineSummary>, PageMeta)> {
        self.count("list_pipelines");
        let state = self.state();
        if let Some(err) = &state.listing_error {
            return Err(err.clone());
        }

        let per_page = per_page.max(1);
        let total = state.listing.len();
        let start = (page.max(1) as usize - 1) * per_page as usize;
        let items: Vec<PipelineSummary> = state
            .listing
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect();
        let meta = PageMeta {
            current_page: page.max(1),
            per_page,
            total_pages: total.div_ceil(per_page as usize) as u32,
            total_items: total as u64,
        };
        Ok((items, meta))
    }

    async fn get_pipeline(&self, id: PipelineId) -> GatewayResult<PipelineDetail> {
        self.count("get_pipeline");
        self.simulate_latency().await;
        let state = self.state();
        if state.failing_pipelines.contains(&id) {
            return Err(server_error(format!("pipeline {id}")));
        }
        state
            .details
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("pipeline {id}")))
    }

    async fn list_pipeline_jobs(&self, id: PipelineId) -> GatewayResult<Vec<JobSummary>> {
        self.count("list_pipeline_jobs");
        Ok(self.state().jobs.get(&id).cloned().unwrap_or_default())
    }

    async fn get_commit(&self, sha: &str) -> GatewayResult<CommitDetail> {
        self.count("get_commit");
        self.simulate_latency().await;
        let state = self.state();
        if state.failing_commits.contains(sha) {
            return Err(server_error(format!("commit {sha}")));
        }
        state
            .commits
            .get(sha)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("commit {sha}")))
    }

    async fn list_branches(&self) -> GatewayResult<Vec<BranchInfo>> {
        self.count("list_branches");
        Ok(self.state().branches.clone())
    }

    async fn create_branch(&self, name: &str, from_ref: &str) -> GatewayResult<BranchInfo> {
        self.count("create_branch");
        let mut state = self.state();
        if state.branches.iter().any(|b| b.name == name) {
            return Err(GatewayError::Http {
                status: 400,
                body: "Branch already exists".to_string(),
            });
        }
        let commit_sha = state
            .branches
            .iter()
            .find(|b| b.name == from_ref)
            .map(|b| b.commit_sha.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("ref {from_ref}")))?;
        let branch = BranchInfo {
            name: name.to_string(),
            commit_sha,
            protected: false,
        };
        state.branches.push(branch.clone());
        Ok(branch)
    }

    async fn list_open_merge_requests(
        &self,
        source: &str,
        target: &str,
    ) -> GatewayResult<Vec<MergeRequest>> {
        self.count("list_open_merge_requests");
        Ok(self
            .state()
            .merge_requests
            .iter()
            .filter(|mr| {
                mr.state == "opened" && mr.source_branch == source && mr.target_branch == target
            })
            .cloned()
            .collect())
    }

    async fn create_merge_request(&self, request: &NewMergeRequest) -> GatewayResult<MergeRequest> {
        self.count("create_merge_request");
        let mut state = self.state();
        let iid = state.next_iid;
        state.next_iid += 1;
        let mr = MergeRequest {
            iid,
            state: "opened".to_string(),
            title: request.title.clone(),
            source_branch: request.source_branch.clone(),
            target_branch: request.target_branch.clone(),
            web_url: format!("https://ci.example.test/merge_requests/{iid}"),
            merge_status: "can_be_merged".to_string(),
            has_conflicts: false,
            draft: false,
            blocking_discussions_resolved: true,
            merge_commit_sha: None,
            merged_at: None,
        };
        state.merge_requests.push(mr.clone());
        Ok(mr)
    }

    async fn get_merge_request(&self, iid: u64) -> GatewayResult<MergeRequest> {
        self.count("get_merge_request");
        let mut state = self.state();
        if state.failing_merge_request_reads {
            return Err(server_error(format!("merge request {iid}")));
        }
        let next_status = state.merge_status_script.get_mut(&iid).and_then(|script| {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        });
        let mr = state
            .merge_requests
            .iter_mut()
            .find(|mr| mr.iid == iid)
            .ok_or_else(|| GatewayError::NotFound(format!("merge request {iid}")))?;
        if let Some(status) = next_status {
            mr.merge_status = status;
        }
        Ok(mr.clone())
    }

    async fn accept_merge_request(
        &self,
        iid: u64,
        options: &AcceptOptions,
    ) -> GatewayResult<MergeRequest> {
        self.count("accept_merge_request");
        let mut state = self.state();
        let mr = state
            .merge_requests
            .iter_mut()
            .find(|mr| mr.iid == iid)
            .ok_or_else(|| GatewayError::NotFound(format!("merge request {iid}")))?;
        if mr.state != "opened" {
            return Err(GatewayError::Http {
                status: 405,
                body: "Method Not Allowed".to_string(),
            });
        }
        if !options.merge_when_pipeline_succeeds {
            mr.state = "merged".to_string();
            mr.merge_commit_sha = Some(format!("{iid:040x}"));
            mr.merged_at = Some(Utc::now());
        }
        Ok(mr.clone())
    }
}
