//! Task-type classification
//!
//! Overlays a [`TaskType`] onto a page of enriched records using the hint
//! ledger as evidence. Per branch present in the page:
//!
//! 1. Every record is reset to [`TaskType::ModifyFile`].
//! 2. Records are ordered by creation time (unparseable times sort first).
//! 3. Each create-branch hint claims one record: the first one created no
//!    earlier than `hint - window`, else the earliest unclaimed one. The claim
//!    rewrites the commit message to [`CREATE_BRANCH_LABEL`].
//! 4. Each merge hint with a SHA marks every unclaimed record on that commit
//!    as [`TaskType::Merge`]. When nothing matches, or when the hint carries no
//!    SHA at all, a synthetic `pending` row is appended instead.
//!
//! Classification is pure apart from synthetic id allocation: it never
//! fails and never touches the ledger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

use crate::format::{format_created_at, parse_created_at};
use crate::hints::{Hint, HintKind};
use crate::model::{EnrichedRecord, PipelineId, TaskType};

/// Commit message shown on records claimed by a create-branch hint.
pub const CREATE_BRANCH_LABEL: &str = "create branch";

/// Status carried by synthetic rows.
pub const SYNTHETIC_STATUS: &str = "pending";

static NEXT_SYNTHETIC_ID: AtomicI64 = AtomicI64::new(-1);

/// Allocate a negative id that is unique for the process lifetime.
pub fn next_synthetic_id() -> PipelineId {
    NEXT_SYNTHETIC_ID.fetch_sub(1, Ordering::Relaxed)
}

/// What one classification pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyOutcome {
    pub create_branch_claims: usize,
    pub merge_matches: usize,
    pub synthetic_rows: usize,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    window: chrono::Duration,
    display_offset: FixedOffset,
}

impl Classifier {
    pub fn new(create_branch_window: Duration, display_offset: FixedOffset) -> Self {
        Self {
            window: chrono::Duration::from_std(create_branch_window)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            display_offset,
        }
    }

    /// Annotate `records` in place and append synthetic rows for unmatched
    /// merge hints.
    ///
    /// Task types are recomputed from scratch, so rerunning over the same
    /// input yields the same labels. Synthetic rows are appended on every
    /// call; run this exactly once per freshly fetched page.
    pub fn classify(&self, records: &mut Vec<EnrichedRecord>, hints: &[Hint]) -> ClassifyOutcome {
        let mut outcome = ClassifyOutcome::default();
        let mut synthetic = Vec::new();

        for (branch, mut group) in self.group_by_branch(records) {
            group.sort_by_key(|&i| parse_created_at(&records[i].created_at, &self.display_offset));

            for hint in hints
                .iter()
                .filter(|h| h.kind == HintKind::CreateBranch && h.branch == branch)
            {
                if let Some(i) = self.pick_create_branch(records, &group, hint) {
                    let record = &mut records[i];
                    record.task_type = TaskType::CreateBranch;
                    record.commit_message = CREATE_BRANCH_LABEL.to_string();
                    outcome.create_branch_claims += 1;
                    debug!(
                        branch = %branch,
                        pipeline_id = record.id,
                        "create-branch hint claimed record"
                    );
                }
            }

            for hint in hints
                .iter()
                .filter(|h| h.kind == HintKind::Merge && h.branch == branch)
            {
                let matched = match hint.sha.as_deref() {
                    Some(sha) => mark_merges(records, &group, sha),
                    None => 0,
                };
                if matched > 0 {
                    outcome.merge_matches += matched;
                    continue;
                }
                let row = self.synthetic_row(hint);
                debug!(
                    branch = %branch,
                    synthetic_id = row.id,
                    "merge hint unmatched; injecting pending row"
                );
                synthetic.push(row);
            }
        }

        outcome.synthetic_rows = synthetic.len();
        records.extend(synthetic);
        outcome
    }

    /// Reset labels and group record indices by branch, in first-seen order.
    fn group_by_branch(&self, records: &mut [EnrichedRecord]) -> Vec<(String, Vec<usize>)> {
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        let mut slot_of: HashMap<String, usize> = HashMap::new();
        for (i, record) in records.iter_mut().enumerate() {
            record.task_type = TaskType::ModifyFile;
            let slot = *slot_of.entry(record.branch_name.clone()).or_insert_with(|| {
                groups.push((record.branch_name.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(i);
        }
        groups
    }

    /// First unclaimed record inside the window, else the earliest unclaimed.
    fn pick_create_branch(
        &self,
        records: &[EnrichedRecord],
        group: &[usize],
        hint: &Hint,
    ) -> Option<usize> {
        let mut unclaimed = group
            .iter()
            .copied()
            .filter(|&i| records[i].task_type != TaskType::CreateBranch)
            .peekable();
        let earliest = *unclaimed.peek()?;

        let Some(ts) = hint.timestamp else {
            return Some(earliest);
        };
        let threshold = ts
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let in_window = unclaimed
            .find(|&i| parse_created_at(&records[i].created_at, &self.display_offset) >= threshold);
        Some(in_window.unwrap_or(earliest))
    }

    fn synthetic_row(&self, hint: &Hint) -> EnrichedRecord {
        EnrichedRecord {
            id: next_synthetic_id(),
            status: SYNTHETIC_STATUS.to_string(),
            branch_name: hint.branch.clone(),
            environment_name: String::new(),
            trigger_user: String::new(),
            commit_id: String::new(),
            commit_message: hint.title.clone().unwrap_or_default(),
            commit_author: String::new(),
            created_at: format_created_at(hint.timestamp, &self.display_offset),
            web_url: hint.url.clone().unwrap_or_default(),
            duration: String::new(),
            task_type: TaskType::Merge,
        }
    }
}

/// Mark unclaimed records on `sha` as merges; returns how many matched.
fn mark_merges(records: &mut [EnrichedRecord], group: &[usize], sha: &str) -> usize {
    let mut matched = 0;
    for &i in group {
        let record = &mut records[i];
        if record.task_type == TaskType::CreateBranch || record.commit_id != sha {
            continue;
        }
        record.task_type = TaskType::Merge;
        matched += 1;
    }
    matched
}
