//! Data model shared by the gateway, the enrichment stage and the classifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a pipeline in the external service.
///
/// Synthetic rows injected by the classifier use negative values.
pub type PipelineId = i64;

/// One row of the external service's pipeline listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: PipelineId,
    pub status: String,
    /// Branch (or tag) the pipeline ran for
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Commit SHA; empty when the service did not report one
    pub sha: String,
    pub web_url: String,
}

/// User that triggered a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

impl UserRef {
    /// Display name, falling back to the handle.
    pub fn display(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else {
            &self.username
        }
    }
}

/// Full pipeline record, fetched lazily and cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDetail {
    pub id: PipelineId,
    pub status: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Run time in seconds as reported by the service
    pub duration: Option<i64>,
    pub user: Option<UserRef>,
}

/// Commit metadata, fetched lazily by SHA and cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDetail {
    pub sha: String,
    pub title: String,
    pub message: String,
    pub author_name: String,
}

impl CommitDetail {
    /// Title line, or the full message when the title is empty.
    pub fn headline(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else {
            &self.message
        }
    }
}

/// Why a pipeline run exists, as inferred by the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    #[default]
    ModifyFile,
    CreateBranch,
    Merge,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ModifyFile => "modify-file",
            TaskType::CreateBranch => "create-branch",
            TaskType::Merge => "merge",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feed row: pipeline summary joined with its detail and commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub id: PipelineId,
    pub status: String,
    pub branch_name: String,
    /// Always empty here; filled in by collaborators that own environments
    pub environment_name: String,
    pub trigger_user: String,
    pub commit_id: String,
    pub commit_message: String,
    pub commit_author: String,
    /// `YYYY-MM-DD HH:MM:SS` in the display zone, or empty
    pub created_at: String,
    pub web_url: String,
    pub duration: String,
    pub task_type: TaskType,
}

/// A CI job belonging to a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub stage: String,
}

/// A pipeline together with its jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOverview {
    pub id: PipelineId,
    pub status: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub commit_sha: String,
    pub protected: bool,
}

/// Merge request as seen through the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub iid: u64,
    pub state: String,
    pub title: String,
    pub source_branch: String,
    pub target_branch: String,
    pub web_url: String,
    /// Mergeability as computed by the service (`can_be_merged`, `checking`, ...)
    pub merge_status: String,
    pub has_conflicts: bool,
    pub draft: bool,
    pub blocking_discussions_resolved: bool,
    pub merge_commit_sha: Option<String>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// Parameters for opening a merge request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMergeRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: Option<String>,
    pub squash: bool,
    pub remove_source_branch: bool,
    pub merge_when_pipeline_succeeds: bool,
}

/// Parameters for accepting a merge request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOptions {
    pub squash: bool,
    pub remove_source_branch: bool,
    pub merge_when_pipeline_succeeds: bool,
    pub merge_commit_message: Option<String>,
}

/// Pagination metadata reported by the external listing call.
///
/// Fields the service did not report are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
}
