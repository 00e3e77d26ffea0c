//! Enrichment, caching and paging behaviour of the feed engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pipefeed_core::fakes::MemoryGateway;
use pipefeed_core::{
    EngineConfig, FeedEngine, FeedError, GatewayError, PipelineDetail, PipelineId,
    PipelineSummary, TaskType, UserRef,
};

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn engine(gateway: &Arc<MemoryGateway>) -> FeedEngine {
    FeedEngine::new(gateway.clone(), EngineConfig::default()).unwrap()
}

fn ids(page: &pipefeed_core::FeedPage) -> Vec<PipelineId> {
    page.items.iter().map(|r| r.id).collect()
}

#[tokio::test]
async fn test_records_keep_listing_order() {
    let gw = Arc::new(
        MemoryGateway::new()
            .with_pipeline(30, "main", "c", ts("2024-01-01T00:03:00Z"))
            .with_pipeline(20, "feature/a", "b", ts("2024-01-01T00:02:00Z"))
            .with_pipeline(10, "main", "a", ts("2024-01-01T00:01:00Z")),
    );
    let page = engine(&gw).list_enriched_page(1, 20).await.unwrap();

    assert_eq!(ids(&page), vec![30, 20, 10]);
    assert!(page.items.iter().all(|r| r.task_type == TaskType::ModifyFile));
    assert!(page.items.iter().all(|r| r.environment_name.is_empty()));
}

#[tokio::test]
async fn test_record_fields_are_joined_from_detail_and_commit() {
    let summary = PipelineSummary {
        id: 5,
        status: "running".to_string(),
        ref_name: "feature/login".to_string(),
        sha: "deadbeef".to_string(),
        web_url: "https://ci.example.test/p/5".to_string(),
    };
    let detail = PipelineDetail {
        id: 5,
        status: "running".to_string(),
        ref_name: "feature/login".to_string(),
        sha: "deadbeef".to_string(),
        created_at: Some(ts("2024-05-01T02:03:04Z")),
        updated_at: Some(ts("2024-05-01T02:05:04Z")),
        duration: None,
        user: Some(UserRef {
            name: String::new(),
            username: "jdoe".to_string(),
        }),
    };
    let gw = Arc::new(
        MemoryGateway::new()
            .with_pipeline_parts(summary, detail)
            .with_commit("deadbeef", "Add login form", "Jo Doe"),
    );

    let page = engine(&gw).list_enriched_page(1, 20).await.unwrap();
    let record = &page.items[0];
    assert_eq!(record.status, "running");
    assert_eq!(record.branch_name, "feature/login");
    assert_eq!(record.trigger_user, "jdoe");
    assert_eq!(record.commit_id, "deadbeef");
    assert_eq!(record.commit_message, "Add login form");
    assert_eq!(record.commit_author, "Jo Doe");
    assert_eq!(record.created_at, "2024-05-01 10:03:04");
    assert_eq!(record.duration, "120s");
    assert_eq!(record.web_url, "https://ci.example.test/p/5");
}

#[tokio::test]
async fn test_failed_items_are_dropped_not_fatal() {
    let gw = Arc::new(
        MemoryGateway::new()
            .with_pipeline(4, "main", "d", ts("2024-01-01T00:04:00Z"))
            .with_pipeline(3, "main", "c", ts("2024-01-01T00:03:00Z"))
            .with_pipeline(2, "main", "b", ts("2024-01-01T00:02:00Z"))
            .with_pipeline(1, "main", "a", ts("2024-01-01T00:01:00Z"))
            .fail_pipeline(3)
            .fail_commit("b"),
    );
    let engine = engine(&gw);
    let page = engine.list_enriched_page(1, 20).await.unwrap();

    assert_eq!(ids(&page), vec![4, 1]);
    assert_eq!(engine.metrics().snapshot().enrich_failures, 2);
}

#[tokio::test]
async fn test_missing_sha_skips_commit_lookup() {
    let gw = Arc::new(MemoryGateway::new().with_pipeline(
        1,
        "main",
        "",
        ts("2024-01-01T00:00:00Z"),
    ));
    let page = engine(&gw).list_enriched_page(1, 20).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert!(page.items[0].commit_message.is_empty());
    assert!(page.items[0].commit_author.is_empty());
    assert_eq!(gw.calls("get_commit"), 0);
}

#[tokio::test]
async fn test_duplicate_ids_collapse_to_first() {
    let gw = Arc::new(
        MemoryGateway::new()
            .with_pipeline(2, "main", "b", ts("2024-01-01T00:02:00Z"))
            .with_pipeline(1, "main", "a", ts("2024-01-01T00:01:00Z"))
            .with_listing_row(PipelineSummary {
                id: 2,
                status: "stale".to_string(),
                ref_name: "main".to_string(),
                sha: "b".to_string(),
                web_url: String::new(),
            }),
    );
    let page = engine(&gw).list_enriched_page(1, 20).await.unwrap();

    assert_eq!(ids(&page), vec![2, 1]);
    assert_eq!(page.items[0].status, "success");
}

#[tokio::test]
async fn test_listing_failure_fails_the_request() {
    let gw = Arc::new(MemoryGateway::new().fail_listing(GatewayError::Http {
        status: 502,
        body: "bad gateway".to_string(),
    }));
    let err = engine(&gw).list_enriched_page(1, 20).await.unwrap_err();

    assert!(matches!(
        err,
        FeedError::Gateway(GatewayError::Http { status: 502, .. })
    ));
}

#[tokio::test]
async fn test_empty_listing_yields_empty_page() {
    let gw = Arc::new(MemoryGateway::new());
    let page = engine(&gw).list_enriched_page(1, 20).await.unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.pagination.total_pages, 0);
    assert_eq!(page.pagination.next_page, 0);
    assert_eq!(page.pagination.prev_page, 0);
}

#[tokio::test(start_paused = true)]
async fn test_detail_is_cached_within_ttl() {
    let gw = Arc::new(
        MemoryGateway::new()
            .with_pipeline(2, "main", "b", ts("2024-01-01T00:02:00Z"))
            .with_pipeline(1, "main", "a", ts("2024-01-01T00:01:00Z")),
    );
    let engine = engine(&gw);

    engine.list_enriched_page(1, 20).await.unwrap();
    assert_eq!(gw.calls("get_pipeline"), 2);
    assert_eq!(gw.calls("get_commit"), 2);

    tokio::time::advance(Duration::from_secs(10)).await;
    engine.list_enriched_page(1, 20).await.unwrap();
    assert_eq!(gw.calls("get_pipeline"), 2, "served from cache");
    assert_eq!(gw.calls("get_commit"), 2, "served from cache");

    tokio::time::advance(Duration::from_secs(31)).await;
    engine.list_enriched_page(1, 20).await.unwrap();
    assert_eq!(gw.calls("get_pipeline"), 4, "refetched after expiry");
    assert_eq!(gw.calls("list_pipelines"), 3, "listing is never cached");

    let metrics = engine.metrics().snapshot();
    assert_eq!(metrics.cache_hits, 4);
    assert_eq!(metrics.cache_misses, 8);
    assert_eq!(metrics.pages_served, 3);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_fetches_are_bounded() {
    let mut gateway = MemoryGateway::new().with_latency(Duration::from_millis(100));
    for id in 1..=24 {
        gateway =
            gateway.with_pipeline(id, "main", &format!("sha{id}"), ts("2024-01-01T00:00:00Z"));
    }
    let gw = Arc::new(gateway);

    let page = engine(&gw).list_enriched_page(1, 50).await.unwrap();

    assert_eq!(page.items.len(), 24);
    assert!(gw.max_in_flight() <= 8, "peak was {}", gw.max_in_flight());
    assert!(gw.max_in_flight() > 1, "fetches should overlap");
}

#[tokio::test(start_paused = true)]
async fn test_custom_concurrency_bound() {
    let mut gateway = MemoryGateway::new().with_latency(Duration::from_millis(50));
    for id in 1..=10 {
        gateway = gateway.with_pipeline(id, "main", "", ts("2024-01-01T00:00:00Z"));
    }
    let gw = Arc::new(gateway);
    let engine =
        FeedEngine::new(gw.clone(), EngineConfig::default().with_max_concurrency(2)).unwrap();

    engine.list_enriched_page(1, 20).await.unwrap();
    assert!(gw.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_page_arguments_are_normalised() {
    let mut gateway = MemoryGateway::new();
    for id in (1..=45).rev() {
        gateway = gateway.with_pipeline(id, "main", "", ts("2024-01-01T00:00:00Z"));
    }
    let gw = Arc::new(gateway);
    let engine = engine(&gw);

    let first = engine.list_enriched_page(0, 0).await.unwrap();
    assert_eq!(first.pagination.current_page, 1);
    assert_eq!(first.pagination.per_page, 20);
    assert_eq!(first.items.len(), 20);
    assert_eq!(first.pagination.total_pages, 3);
    assert_eq!(first.pagination.total_items, 45);
    assert_eq!((first.pagination.prev_page, first.pagination.next_page), (0, 2));

    let last = engine.list_enriched_page(3, 20).await.unwrap();
    assert_eq!(last.items.len(), 5);
    assert_eq!((last.pagination.prev_page, last.pagination.next_page), (2, 0));

    let clamped = engine.list_enriched_page(1, 500).await.unwrap();
    assert_eq!(clamped.pagination.per_page, 100);
    assert_eq!(clamped.items.len(), 45);
}

#[tokio::test]
async fn test_pipeline_detail_includes_jobs() {
    let gw = Arc::new(
        MemoryGateway::new()
            .with_pipeline(9, "main", "a", ts("2024-01-01T00:00:00Z"))
            .with_jobs(
                9,
                vec![pipefeed_core::JobSummary {
                    id: 100,
                    name: "build".to_string(),
                    status: "success".to_string(),
                    stage: "build".to_string(),
                }],
            ),
    );
    let engine = engine(&gw);

    let overview = engine.pipeline_detail(9).await.unwrap();
    assert_eq!(overview.id, 9);
    assert_eq!(overview.jobs.len(), 1);
    assert_eq!(overview.jobs[0].name, "build");

    assert!(matches!(
        engine.pipeline_detail(404).await,
        Err(FeedError::Gateway(GatewayError::NotFound(_)))
    ));
}
