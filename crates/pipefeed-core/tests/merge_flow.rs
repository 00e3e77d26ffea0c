//! Branch, merge-request and promotion flows and the hints they leave.

use std::sync::Arc;

use pipefeed_core::fakes::MemoryGateway;
use pipefeed_core::{
    AcceptOptions, BranchStage, EngineConfig, FeedEngine, FeedError, HintKind, MergeRequest,
    NewMergeRequest, PromoteRequest,
};

fn engine(gateway: &Arc<MemoryGateway>) -> FeedEngine {
    FeedEngine::new(gateway.clone(), EngineConfig::default()).unwrap()
}

fn open_mr(iid: u64, source: &str, target: &str) -> MergeRequest {
    MergeRequest {
        iid,
        state: "opened".to_string(),
        title: format!("{source} -> {target}"),
        source_branch: source.to_string(),
        target_branch: target.to_string(),
        web_url: format!("https://ci.example.test/merge_requests/{iid}"),
        merge_status: "can_be_merged".to_string(),
        blocking_discussions_resolved: true,
        ..Default::default()
    }
}

fn new_mr(source: &str, target: &str) -> NewMergeRequest {
    NewMergeRequest {
        source_branch: source.to_string(),
        target_branch: target.to_string(),
        title: format!("{source} -> {target}"),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_branch_records_hint() {
    let gw = Arc::new(MemoryGateway::new());
    let engine = engine(&gw);

    let branch = engine.create_branch("feature/login").await.unwrap();
    assert_eq!(branch.name, "feature/login");
    assert!(gw.branch_names().contains(&"feature/login".to_string()));

    let hints = engine.hints();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].kind, HintKind::CreateBranch);
    assert_eq!(hints[0].branch, "feature/login");
    assert_eq!(engine.metrics().snapshot().hints_recorded, 1);
}

#[tokio::test]
async fn test_create_branch_rejects_bad_names_without_calling_out() {
    let gw = Arc::new(MemoryGateway::new());
    let engine = engine(&gw);

    for name in ["hotfix/x", "feature/", "main", ""] {
        assert!(matches!(
            engine.create_branch(name).await,
            Err(FeedError::InvalidBranchName(_))
        ));
    }
    assert_eq!(gw.calls("create_branch"), 0);
    assert!(engine.hints().is_empty());
}

#[tokio::test]
async fn test_failed_branch_creation_records_nothing() {
    let gw = Arc::new(MemoryGateway::new().with_branch("feature/dup"));
    let engine = engine(&gw);

    assert!(engine.create_branch("feature/dup").await.is_err());
    assert!(engine.hints().is_empty());
}

// ---------------------------------------------------------------------------
// Merge requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_merge_request_ensures_target_and_records_hint() {
    let gw = Arc::new(MemoryGateway::new().with_branch("feature/x"));
    let engine = engine(&gw);

    let mr = engine
        .create_merge_request(&new_mr("feature/x", "test/x"))
        .await
        .unwrap();

    assert_eq!(mr.state, "opened");
    assert!(gw.branch_names().contains(&"test/x".to_string()));

    let hints = engine.hints();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].kind, HintKind::Merge);
    assert_eq!(hints[0].branch, "test/x");
    assert_eq!(hints[0].url.as_deref(), Some(mr.web_url.as_str()));
    assert_eq!(hints[0].title.as_deref(), Some("feature/x -> test/x"));
    assert!(hints[0].sha.is_none());
}

#[tokio::test]
async fn test_existing_open_merge_request_is_reused() {
    let gw = Arc::new(MemoryGateway::new().with_merge_request(open_mr(12, "feature/x", "test/x")));
    let engine = engine(&gw);

    let mr = engine
        .create_merge_request(&new_mr("feature/x", "test/x"))
        .await
        .unwrap();

    assert_eq!(mr.iid, 12);
    assert_eq!(gw.calls("create_merge_request"), 0);
    assert!(engine.hints().is_empty(), "reuse records no hint");
}

#[tokio::test]
async fn test_merge_request_input_is_validated() {
    let gw = Arc::new(MemoryGateway::new());
    let engine = engine(&gw);

    let same = new_mr("feature/x", "feature/x");
    assert!(matches!(
        engine.create_merge_request(&same).await,
        Err(FeedError::InvalidInput(_))
    ));
    let untitled = NewMergeRequest {
        title: String::new(),
        ..new_mr("feature/x", "test/x")
    };
    assert!(engine.create_merge_request(&untitled).await.is_err());
    assert_eq!(gw.calls("list_open_merge_requests"), 0);
}

#[tokio::test]
async fn test_accept_records_merge_hint_with_sha() {
    let gw = Arc::new(MemoryGateway::new().with_merge_request(open_mr(3, "test/x", "release/x")));
    let engine = engine(&gw);

    let merged = engine
        .accept_merge_request(3, &AcceptOptions::default())
        .await
        .unwrap();

    assert_eq!(merged.state, "merged");
    let hints = engine.hints();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].branch, "release/x");
    assert_eq!(hints[0].sha, merged.merge_commit_sha);
    assert_eq!(hints[0].timestamp, merged.merged_at);
}

#[tokio::test]
async fn test_accept_precondition_failures() {
    let closed = MergeRequest {
        state: "closed".to_string(),
        ..open_mr(1, "a/x", "b/x")
    };
    let draft = MergeRequest {
        draft: true,
        ..open_mr(2, "a/x", "b/x")
    };
    let conflicted = MergeRequest {
        has_conflicts: true,
        ..open_mr(3, "a/x", "b/x")
    };
    let discussing = MergeRequest {
        blocking_discussions_resolved: false,
        ..open_mr(4, "a/x", "b/x")
    };
    let unmergeable = MergeRequest {
        merge_status: "cannot_be_merged".to_string(),
        ..open_mr(5, "a/x", "b/x")
    };
    let gw = Arc::new(
        MemoryGateway::new()
            .with_merge_request(closed)
            .with_merge_request(draft)
            .with_merge_request(conflicted)
            .with_merge_request(discussing)
            .with_merge_request(unmergeable),
    );
    let engine = engine(&gw);
    let opts = AcceptOptions::default();

    assert!(matches!(
        engine.accept_merge_request(1, &opts).await,
        Err(FeedError::MergeRequestNotOpen { iid: 1, .. })
    ));
    assert!(matches!(
        engine.accept_merge_request(2, &opts).await,
        Err(FeedError::MergeRequestDraft(2))
    ));
    assert!(matches!(
        engine.accept_merge_request(3, &opts).await,
        Err(FeedError::MergeConflicts(3))
    ));
    assert!(matches!(
        engine.accept_merge_request(4, &opts).await,
        Err(FeedError::UnresolvedDiscussions(4))
    ));
    assert!(matches!(
        engine.accept_merge_request(5, &opts).await,
        Err(FeedError::NotMergeable { iid: 5, .. })
    ));
    assert_eq!(gw.calls("accept_merge_request"), 0);
    assert!(engine.hints().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_accept_waits_for_merge_status_check() {
    let gw = Arc::new(
        MemoryGateway::new()
            .with_merge_request(open_mr(9, "feature/x", "test/x"))
            .with_merge_status_script(9, &["checking", "unchecked", "can_be_merged"]),
    );
    let engine = engine(&gw);

    let merged = engine
        .accept_merge_request(9, &AcceptOptions::default())
        .await
        .unwrap();

    assert_eq!(merged.state, "merged");
    assert_eq!(gw.calls("get_merge_request"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_accept_gives_up_when_check_never_finishes() {
    let gw = Arc::new(
        MemoryGateway::new()
            .with_merge_request(open_mr(9, "feature/x", "test/x"))
            .with_merge_status_script(9, &["checking"]),
    );
    let engine = engine(&gw);

    let err = engine
        .accept_merge_request(9, &AcceptOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, FeedError::NotMergeable { iid: 9, ref status } if status == "checking"));
    assert_eq!(gw.calls("accept_merge_request"), 0);
}

#[tokio::test]
async fn test_accept_proceeds_when_precondition_read_fails() {
    let gw = Arc::new(
        MemoryGateway::new()
            .with_merge_request(open_mr(4, "feature/x", "test/x"))
            .fail_merge_request_reads(),
    );
    let engine = engine(&gw);

    let merged = engine
        .accept_merge_request(4, &AcceptOptions::default())
        .await
        .unwrap();
    assert_eq!(merged.state, "merged");
    assert_eq!(engine.hints().len(), 1);
}

#[tokio::test]
async fn test_merge_when_pipeline_succeeds_leaves_sha_empty() {
    let gw = Arc::new(MemoryGateway::new().with_merge_request(open_mr(6, "release/x", "main")));
    let engine = engine(&gw);
    let opts = AcceptOptions {
        merge_when_pipeline_succeeds: true,
        ..Default::default()
    };

    engine.accept_merge_request(6, &opts).await.unwrap();

    let hints = engine.hints();
    assert_eq!(hints[0].branch, "main");
    assert!(hints[0].sha.is_none());
}

#[tokio::test]
async fn test_auto_merge_creates_then_accepts() {
    let gw = Arc::new(MemoryGateway::new().with_branch("feature/x"));
    let engine = engine(&gw);

    let merged = engine
        .auto_merge(&new_mr("feature/x", "test/x"), &AcceptOptions::default())
        .await
        .unwrap();

    assert_eq!(merged.state, "merged");
    assert_eq!(gw.calls("create_merge_request"), 1);
    assert_eq!(gw.calls("accept_merge_request"), 1);
    // One hint for opening the request, one for the merge itself.
    assert_eq!(engine.hints().len(), 2);
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

fn promote(stage: BranchStage, name: &str, target: Option<&str>) -> PromoteRequest {
    PromoteRequest {
        stage,
        name: name.to_string(),
        target: target.map(str::to_string),
        title: None,
        description: None,
        accept: AcceptOptions::default(),
        squash: false,
        remove_source_branch: false,
    }
}

#[tokio::test]
async fn test_promote_feature_to_test() {
    let gw = Arc::new(MemoryGateway::new().with_branch("feature/pay"));
    let engine = engine(&gw);

    let merged = engine
        .promote(&promote(BranchStage::Feature, "pay", None))
        .await
        .unwrap();

    assert_eq!(merged.source_branch, "feature/pay");
    assert_eq!(merged.target_branch, "test/pay");
    assert_eq!(merged.title, "feature/pay -> test/pay");
    assert_eq!(merged.state, "merged");

    // Only the completed merge leaves a hint.
    let hints = engine.hints();
    assert_eq!(hints.len(), 1);
    assert!(hints[0].sha.is_some());
}

#[tokio::test]
async fn test_promote_release_defaults_to_main() {
    let gw = Arc::new(MemoryGateway::new().with_branch("release/2.0"));
    let engine = engine(&gw);

    let merged = engine
        .promote(&promote(BranchStage::Release, "2.0", Some("auto")))
        .await
        .unwrap();
    assert_eq!(merged.target_branch, "main");
}

#[tokio::test]
async fn test_promote_explicit_target_and_reuse() {
    let gw = Arc::new(
        MemoryGateway::new().with_merge_request(open_mr(21, "test/pay", "release/hotfix")),
    );
    let engine = engine(&gw);

    let merged = engine
        .promote(&promote(BranchStage::Test, "pay", Some("release/hotfix")))
        .await
        .unwrap();

    assert_eq!(merged.iid, 21);
    assert_eq!(gw.calls("create_merge_request"), 0);
}

#[tokio::test]
async fn test_promote_requires_a_name() {
    let gw = Arc::new(MemoryGateway::new());
    let engine = engine(&gw);

    assert!(matches!(
        engine.promote(&promote(BranchStage::Feature, " ", None)).await,
        Err(FeedError::InvalidInput(_))
    ));
}
