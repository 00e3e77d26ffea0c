//! GitLab REST payloads and their conversion into the core model.
//!
//! GitLab omits or nulls fields freely depending on version and permissions,
//! so everything that is not an identifier defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pipefeed_core::{
    AcceptOptions, BranchInfo, CommitDetail, JobSummary, MergeRequest, NewMergeRequest,
    PipelineDetail, PipelineSummary, UserRef,
};

#[derive(Debug, Deserialize)]
pub(crate) struct Pipeline {
    pub id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Seconds; older instances report fractions
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

impl From<Pipeline> for PipelineSummary {
    fn from(p: Pipeline) -> Self {
        PipelineSummary {
            id: p.id,
            status: p.status,
            ref_name: p.ref_name,
            sha: p.sha.unwrap_or_default(),
            web_url: p.web_url,
        }
    }
}

impl From<Pipeline> for PipelineDetail {
    fn from(p: Pipeline) -> Self {
        PipelineDetail {
            id: p.id,
            status: p.status,
            ref_name: p.ref_name,
            sha: p.sha.unwrap_or_default(),
            created_at: p.created_at,
            updated_at: p.updated_at,
            duration: p.duration.map(|secs| secs.round() as i64),
            user: p.user.map(|u| UserRef {
                name: u.name,
                username: u.username,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Commit {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author_name: String,
}

impl From<Commit> for CommitDetail {
    fn from(c: Commit) -> Self {
        CommitDetail {
            sha: c.id,
            title: c.title,
            message: c.message,
            author_name: c.author_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Job {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub stage: String,
}

impl From<Job> for JobSummary {
    fn from(j: Job) -> Self {
        JobSummary {
            id: j.id,
            name: j.name,
            status: j.status,
            stage: j.stage,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Branch {
    pub name: String,
    #[serde(default)]
    pub commit: Option<BranchCommit>,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BranchCommit {
    pub id: String,
}

impl From<Branch> for BranchInfo {
    fn from(b: Branch) -> Self {
        BranchInfo {
            name: b.name,
            commit_sha: b.commit.map(|c| c.id).unwrap_or_default(),
            protected: b.protected,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MergeRequestPayload {
    pub iid: u64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default)]
    pub target_branch: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub merge_status: String,
    #[serde(default)]
    pub has_conflicts: bool,
    #[serde(default)]
    pub draft: bool,
    /// Pre-15.0 name for `draft`
    #[serde(default)]
    pub work_in_progress: bool,
    #[serde(default = "default_true")]
    pub blocking_discussions_resolved: bool,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    #[serde(default)]
    pub squash_commit_sha: Option<String>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl From<MergeRequestPayload> for MergeRequest {
    fn from(m: MergeRequestPayload) -> Self {
        MergeRequest {
            iid: m.iid,
            state: m.state,
            title: m.title,
            source_branch: m.source_branch,
            target_branch: m.target_branch,
            web_url: m.web_url,
            merge_status: m.merge_status,
            has_conflicts: m.has_conflicts,
            draft: m.draft || m.work_in_progress,
            blocking_discussions_resolved: m.blocking_discussions_resolved,
            // Squash merges land the squash commit on the target.
            merge_commit_sha: m
                .merge_commit_sha
                .filter(|s| !s.is_empty())
                .or(m.squash_commit_sha.filter(|s| !s.is_empty())),
            merged_at: m.merged_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateMergeRequestBody<'a> {
    pub source_branch: &'a str,
    pub target_branch: &'a str,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub squash: bool,
    pub remove_source_branch: bool,
}

impl<'a> From<&'a NewMergeRequest> for CreateMergeRequestBody<'a> {
    fn from(r: &'a NewMergeRequest) -> Self {
        CreateMergeRequestBody {
            source_branch: &r.source_branch,
            target_branch: &r.target_branch,
            title: &r.title,
            description: r.description.as_deref(),
            squash: r.squash,
            remove_source_branch: r.remove_source_branch,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AcceptBody<'a> {
    pub squash: bool,
    pub should_remove_source_branch: bool,
    pub merge_when_pipeline_succeeds: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit_message: Option<&'a str>,
}

impl<'a> From<&'a AcceptOptions> for AcceptBody<'a> {
    fn from(o: &'a AcceptOptions) -> Self {
        AcceptBody {
            squash: o.squash,
            should_remove_source_branch: o.remove_source_branch,
            merge_when_pipeline_succeeds: o.merge_when_pipeline_succeeds,
            merge_commit_message: o.merge_commit_message.as_deref(),
        }
    }
}
