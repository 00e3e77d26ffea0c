//! Page assembly: listing → enrichment → classification.
//!
//! Classification is page-local. A hint whose matching pipeline sits on a
//! different page goes unmatched on this one; every page build classifies
//! exactly once and nothing classified is cached.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::Classifier;
use crate::enrich::Enricher;
use crate::error::FeedResult;
use crate::gateway::Gateway;
use crate::hints::HintLedger;
use crate::metrics::FeedMetrics;
use crate::model::{EnrichedRecord, PageMeta};

/// Pagination metadata handed back to the caller.
///
/// `next_page` and `prev_page` are zero when not applicable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub next_page: u32,
    pub prev_page: u32,
}

impl Pagination {
    /// Reconcile the service's metadata with what was requested.
    pub fn from_meta(meta: &PageMeta, requested_page: u32, per_page: u32) -> Self {
        let current_page = if meta.current_page > 0 {
            meta.current_page
        } else {
            requested_page
        };
        let total_pages = meta.total_pages;
        let (mut next_page, mut prev_page) = (0, 0);
        if total_pages > 0 {
            if current_page < total_pages {
                next_page = current_page + 1;
            }
            if current_page > 1 {
                prev_page = current_page - 1;
            }
        }
        Self {
            current_page,
            per_page,
            total_pages,
            total_items: meta.total_items,
            next_page,
            prev_page,
        }
    }
}

/// One classified page of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<EnrichedRecord>,
    pub pagination: Pagination,
}

pub struct Pager {
    gateway: Arc<dyn Gateway>,
    enricher: Arc<Enricher>,
    classifier: Classifier,
    ledger: Arc<HintLedger>,
    metrics: Arc<FeedMetrics>,
    default_per_page: u32,
    max_per_page: u32,
}

impl Pager {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        enricher: Arc<Enricher>,
        classifier: Classifier,
        ledger: Arc<HintLedger>,
        metrics: Arc<FeedMetrics>,
        default_per_page: u32,
        max_per_page: u32,
    ) -> Self {
        Self {
            gateway,
            enricher,
            classifier,
            ledger,
            metrics,
            default_per_page,
            max_per_page,
        }
    }

    /// Page 0 is treated as page 1; page size 0 takes the default and large
    /// sizes are clamped.
    pub fn normalize(&self, page: u32, per_page: u32) -> (u32, u32) {
        let page = page.max(1);
        let per_page = match per_page {
            0 => self.default_per_page,
            n => n.min(self.max_per_page),
        };
        (page, per_page)
    }

    /// Fetch, enrich and classify one page.
    ///
    /// Only the listing call can fail the request; per-item failures just
    /// shrink the page.
    pub async fn list_enriched_page(&self, page: u32, per_page: u32) -> FeedResult<FeedPage> {
        let (page, per_page) = self.normalize(page, per_page);

        let (summaries, meta) = self.gateway.list_pipelines(page, per_page).await?;
        debug!(page, per_page, listed = summaries.len(), "pipelines listed");

        let mut items = self.enricher.enrich_page(summaries).await;

        let hints = self.ledger.snapshot();
        let outcome = self.classifier.classify(&mut items, &hints);
        self.metrics.add_synthetic_rows(outcome.synthetic_rows as u64);
        self.metrics.inc_pages_served();

        let pagination = Pagination::from_meta(&meta, page, per_page);
        info!(
            page = pagination.current_page,
            total_pages = pagination.total_pages,
            items = items.len(),
            create_branch = outcome.create_branch_claims,
            merges = outcome.merge_matches,
            synthetic = outcome.synthetic_rows,
            "feed page built"
        );

        Ok(FeedPage { items, pagination })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(current: u32, total_pages: u32) -> PageMeta {
        PageMeta {
            current_page: current,
            per_page: 20,
            total_pages,
            total_items: u64::from(total_pages) * 20,
        }
    }

    #[test]
    fn test_middle_page_has_both_neighbours() {
        let p = Pagination::from_meta(&meta(2, 3), 2, 20);
        assert_eq!(p.current_page, 2);
        assert_eq!(p.next_page, 3);
        assert_eq!(p.prev_page, 1);
        assert_eq!(p.total_items, 60);
    }

    #[test]
    fn test_first_and_last_pages() {
        let first = Pagination::from_meta(&meta(1, 3), 1, 20);
        assert_eq!((first.prev_page, first.next_page), (0, 2));

        let last = Pagination::from_meta(&meta(3, 3), 3, 20);
        assert_eq!((last.prev_page, last.next_page), (2, 0));
    }

    #[test]
    fn test_unknown_totals_disable_navigation() {
        let p = Pagination::from_meta(&PageMeta::default(), 4, 10);
        assert_eq!(p.current_page, 4, "falls back to the requested page");
        assert_eq!(p.per_page, 10);
        assert_eq!((p.prev_page, p.next_page, p.total_pages), (0, 0, 0));
    }

    #[test]
    fn test_pagination_wire_names() {
        let value = serde_json::to_value(Pagination::from_meta(&meta(1, 2), 1, 20)).unwrap();
        for key in [
            "current_page",
            "per_page",
            "total_pages",
            "total_items",
            "next_page",
            "prev_page",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
