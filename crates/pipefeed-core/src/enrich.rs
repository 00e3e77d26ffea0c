//! Enrichment fan-out
//!
//! Expands a page of [`PipelineSummary`] into [`EnrichedRecord`]s by fetching
//! pipeline detail and commit detail for every item concurrently:
//! - one Tokio task per item, gated by a semaphore (`max_concurrency`)
//! - detail lookups go through two [`TtlCache`]s
//! - each task owns one output slot; the caller joins on all of them
//! - failed items leave their slot empty and are dropped, never failing
//!   the batch
//!
//! The output keeps input order and holds at most one record per id.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::error::GatewayResult;
use crate::format::{format_created_at, format_duration};
use crate::gateway::Gateway;
use crate::metrics::FeedMetrics;
use crate::model::{
    CommitDetail, EnrichedRecord, PipelineDetail, PipelineId, PipelineSummary, TaskType,
};

/// Cache-backed detail fetcher shared by every request against one project.
pub struct Enricher {
    gateway: Arc<dyn Gateway>,
    pipelines: TtlCache<PipelineId, PipelineDetail>,
    commits: TtlCache<String, CommitDetail>,
    metrics: Arc<FeedMetrics>,
    cache_ttl: Duration,
    max_concurrency: usize,
    display_offset: FixedOffset,
}

impl Enricher {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        metrics: Arc<FeedMetrics>,
        cache_ttl: Duration,
        max_concurrency: usize,
        display_offset: FixedOffset,
    ) -> Self {
        Self {
            gateway,
            pipelines: TtlCache::new(),
            commits: TtlCache::new(),
            metrics,
            cache_ttl,
            max_concurrency: max_concurrency.max(1),
            display_offset,
        }
    }

    /// Pipeline detail, served from cache while fresh.
    ///
    /// Failures are not cached; the next call fetches again.
    pub async fn pipeline_detail(&self, id: PipelineId) -> GatewayResult<PipelineDetail> {
        if let Some(detail) = self.pipelines.get(&id) {
            self.metrics.inc_cache_hit();
            return Ok(detail);
        }
        self.metrics.inc_cache_miss();
        let detail = self.gateway.get_pipeline(id).await?;
        self.pipelines.put(id, detail.clone(), self.cache_ttl);
        Ok(detail)
    }

    /// Commit detail, served from cache while fresh.
    pub async fn commit(&self, sha: &str) -> GatewayResult<CommitDetail> {
        let key = sha.to_string();
        if let Some(commit) = self.commits.get(&key) {
            self.metrics.inc_cache_hit();
            return Ok(commit);
        }
        self.metrics.inc_cache_miss();
        let commit = self.gateway.get_commit(sha).await?;
        self.commits.put(key, commit.clone(), self.cache_ttl);
        Ok(commit)
    }

    /// Enrich `summaries` concurrently and return the surviving records.
    pub async fn enrich_page(
        self: &Arc<Self>,
        summaries: Vec<PipelineSummary>,
    ) -> Vec<EnrichedRecord> {
        let total = summaries.len();
        let permits = Arc::new(Semaphore::new(self.max_concurrency));

        let handles: Vec<_> = summaries
            .into_iter()
            .map(|summary| {
                let enricher = Arc::clone(self);
                let permits = Arc::clone(&permits);
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return None;
                    };
                    let id = summary.id;
                    match enricher.enrich_one(summary).await {
                        Ok(record) => Some(record),
                        Err(e) => {
                            enricher.metrics.inc_enrich_failure();
                            warn!(
                                pipeline_id = id,
                                error = %e,
                                "dropping pipeline: enrichment failed"
                            );
                            None
                        }
                    }
                })
            })
            .collect();

        // Slot i holds the outcome for input i.
        let slots: Vec<Option<EnrichedRecord>> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(slot) => slot,
                Err(e) => {
                    warn!(error = %e, "enrichment task aborted");
                    None
                }
            })
            .collect();

        let records = dedup_by_id(slots);
        debug!(requested = total, enriched = records.len(), "page enriched");
        records
    }

    async fn enrich_one(&self, summary: PipelineSummary) -> GatewayResult<EnrichedRecord> {
        let detail = self.pipeline_detail(summary.id).await?;

        let (commit_message, commit_author) = if summary.sha.is_empty() {
            (String::new(), String::new())
        } else {
            let commit = self.commit(&summary.sha).await?;
            (commit.headline().to_string(), commit.author_name)
        };

        Ok(EnrichedRecord {
            id: summary.id,
            status: summary.status,
            branch_name: summary.ref_name,
            environment_name: String::new(),
            trigger_user: detail
                .user
                .as_ref()
                .map(|u| u.display().to_string())
                .unwrap_or_default(),
            commit_id: summary.sha,
            commit_message,
            commit_author,
            created_at: format_created_at(detail.created_at, &self.display_offset),
            web_url: summary.web_url,
            duration: format_duration(&detail),
            task_type: TaskType::ModifyFile,
        })
    }
}

/// Drop empty slots and keep the first record per id, preserving order.
pub fn dedup_by_id(slots: Vec<Option<EnrichedRecord>>) -> Vec<EnrichedRecord> {
    let mut seen = HashSet::new();
    slots
        .into_iter()
        .flatten()
        .filter(|record| seen.insert(record.id))
        .collect()
}
