//! Hint ledger
//!
//! An append-only log of user-triggered actions (branch creation, merge
//! requests, completed merges). The CI service has no notion of *why* a
//! pipeline exists; these hints are the side-channel evidence the classifier
//! uses to label pipelines after the fact.
//!
//! Hints live for the process lifetime unless the ledger was built with
//! [`HintRetention::Bounded`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HintRetention;
use crate::model::MergeRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HintKind {
    CreateBranch,
    Merge,
}

/// Locally recorded evidence of an action on `branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub kind: HintKind,
    pub branch: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub title: Option<String>,
    /// Commit produced by a completed merge
    pub sha: Option<String>,
}

impl Hint {
    pub fn create_branch(branch: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: HintKind::CreateBranch,
            branch: branch.into(),
            timestamp: Some(timestamp),
            url: None,
            title: None,
            sha: None,
        }
    }

    pub fn merge(branch: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: HintKind::Merge,
            branch: branch.into(),
            timestamp: Some(timestamp),
            url: None,
            title: None,
            sha: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    /// Merge hint derived from an accepted merge request.
    ///
    /// Timestamped with the merge time when the service reports one.
    pub fn from_merge_result(mr: &MergeRequest) -> Self {
        let timestamp = mr.merged_at.unwrap_or_else(Utc::now);
        Self {
            kind: HintKind::Merge,
            branch: mr.target_branch.clone(),
            timestamp: Some(timestamp),
            url: non_empty(&mr.web_url),
            title: non_empty(&mr.title),
            sha: mr.merge_commit_sha.as_deref().and_then(non_empty),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Mutex-guarded, append-only hint log.
#[derive(Debug, Default)]
pub struct HintLedger {
    hints: Mutex<VecDeque<Hint>>,
    retention: HintRetention,
}

impl HintLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: HintRetention) -> Self {
        Self {
            hints: Mutex::new(VecDeque::new()),
            retention,
        }
    }

    /// Append a hint, evicting the oldest if the retention bound is reached.
    pub fn record(&self, hint: Hint) {
        debug!(kind = ?hint.kind, branch = %hint.branch, "hint recorded");
        let mut hints = self.lock();
        hints.push_back(hint);
        if let HintRetention::Bounded(max) = self.retention {
            while hints.len() > max {
                hints.pop_front();
            }
        }
    }

    pub fn record_create_branch(&self, branch: &str) {
        self.record(Hint::create_branch(branch, Utc::now()));
    }

    pub fn record_merge(&self, branch: &str) {
        self.record(Hint::merge(branch, Utc::now()));
    }

    pub fn record_merge_with_details(&self, branch: &str, url: &str, title: &str) {
        let mut hint = Hint::merge(branch, Utc::now());
        hint.url = non_empty(url);
        hint.title = non_empty(title);
        self.record(hint);
    }

    pub fn record_merge_from_result(&self, mr: &MergeRequest) {
        self.record(Hint::from_merge_result(mr));
    }

    /// Shallow copy of every hint, oldest first.
    pub fn snapshot(&self) -> Vec<Hint> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Hint>> {
        self.hints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
