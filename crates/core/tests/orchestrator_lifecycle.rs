//! Orchestrator lifecycle integration tests.
//!
//! These drive whole acquisitions through the orchestrator with the mock
//! transfer engine: indexing -> active -> done, plus the failure paths.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use swatchr_core::{
    testing::{fixtures, MockTransferEngine},
    CatalogService, CatalogStore, Change, ChangeKind, EntityState, EventBus, Orchestrator,
    OrchestratorConfig, Subscription,
};

/// Test helper owning the catalog directory, engine and orchestrator.
struct TestHarness {
    catalog: Arc<CatalogStore>,
    engine: MockTransferEngine,
    orchestrator: Orchestrator,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(quota_bytes: u64) -> Self {
        Self::with_timeout(quota_bytes, 5)
    }

    fn with_timeout(quota_bytes: u64, metadata_timeout_secs: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let catalog = Arc::new(
            CatalogStore::load(
                temp_dir.path().join("catalog.json"),
                temp_dir.path().join("storage"),
                quota_bytes,
            )
            .expect("Failed to load catalog"),
        );
        let engine = MockTransferEngine::new();

        let config = OrchestratorConfig {
            sample_interval_ms: 5,
            velocity_window: 3,
            metadata_timeout_secs,
        };

        let orchestrator = Orchestrator::new(
            config,
            Arc::clone(&catalog),
            EventBus::new(256),
            Arc::new(engine.clone()),
            None, // No audit for tests
        );

        Self {
            catalog,
            engine,
            orchestrator,
            _temp_dir: temp_dir,
        }
    }

    async fn add(&self, n: u32, title: &str) -> String {
        let hash = fixtures::hash(n);
        self.orchestrator
            .request_add(title, &fixtures::magnet(&hash))
            .await
            .expect("Failed to add entity");
        hash
    }

    async fn wait_for_state(&self, key: &str, expected: EntityState, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if self.catalog.get(key).map(|r| r.state) == Some(expected) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

/// Collect changes for `key` until one of kind `last` arrives.
async fn collect_until(sub: &mut Subscription, key: &str, last: ChangeKind) -> Vec<Arc<Change>> {
    let mut changes = Vec::new();
    loop {
        let change = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for change")
            .expect("feed closed");
        if change.key != key {
            continue;
        }
        let done = change.kind == last;
        changes.push(change);
        if done {
            return changes;
        }
    }
}

#[tokio::test]
async fn test_acquisition_publishes_full_sequence() {
    let harness = TestHarness::new(10_000);
    let hash = fixtures::hash(1);
    harness.engine.set_metadata(&hash, "movie.mkv", 1000).await;
    harness
        .engine
        .set_progress_script(
            &hash,
            vec![(10, 1000), (10, 1000), (50, 1000), (50, 1000), (500, 1000), (1000, 1000)],
        )
        .await;
    let mut sub = harness.orchestrator.bus().subscribe();

    harness.add(1, "Movie").await;
    let changes = collect_until(&mut sub, &hash, ChangeKind::Completed).await;

    let kinds: Vec<ChangeKind> = changes.iter().map(|c| c.kind).collect();
    assert_eq!(kinds[0], ChangeKind::EntityAdded);
    assert_eq!(kinds[1], ChangeKind::MetadataResolved);
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == ChangeKind::ProgressUpdated)
            .count(),
        3
    );
    assert_eq!(*kinds.last().unwrap(), ChangeKind::Completed);

    let resolved = &changes[1];
    assert_eq!(resolved.name, "movie.mkv");
    assert_eq!(resolved.size_formatted, "1000B");

    let completed = changes.last().unwrap();
    assert_eq!(completed.progress_percent, 100);

    let record = harness.catalog.get(&hash).unwrap();
    assert_eq!(record.state, EntityState::Done);
    assert_eq!(harness.catalog.stats().unwrap().used_bytes, 1000);
}

#[tokio::test]
async fn test_metadata_timeout_fails_entity() {
    let harness = TestHarness::with_timeout(10_000, 1);
    let mut sub = harness.orchestrator.bus().subscribe();

    // No metadata configured, the mock waits forever
    let hash = harness.add(1, "Stuck").await;

    let changes = collect_until(&mut sub, &hash, ChangeKind::Failed).await;
    let failed = changes.last().unwrap();
    assert!(failed
        .reason
        .as_deref()
        .unwrap()
        .contains("metadata not resolved"));

    assert_eq!(harness.catalog.get(&hash).unwrap().state, EntityState::Failed);
    assert!(harness.engine.is_cancelled(&hash).await);
}

#[tokio::test]
async fn test_quota_end_to_end() {
    let harness = TestHarness::new(1000);
    let a = fixtures::hash(1);
    let b = fixtures::hash(2);
    let c = fixtures::hash(3);
    for hash in [&a, &b, &c] {
        harness.engine.set_progress_script(hash, vec![(0, 1)]).await;
    }
    harness.engine.set_metadata(&a, "a.mkv", 600).await;
    harness.engine.set_metadata(&b, "b.mkv", 500).await;
    harness.engine.set_metadata(&c, "c.mkv", 500).await;

    harness.add(1, "A").await;
    assert!(
        harness
            .wait_for_state(&a, EntityState::Active, Duration::from_secs(5))
            .await
    );
    assert_eq!(harness.catalog.stats().unwrap().used_bytes, 600);

    // 600 + 500 > 1000
    harness.add(2, "B").await;
    assert!(
        harness
            .wait_for_state(&b, EntityState::Failed, Duration::from_secs(5))
            .await
    );
    assert_eq!(harness.catalog.stats().unwrap().used_bytes, 600);

    harness.orchestrator.request_remove(&a).await.unwrap();
    assert_eq!(harness.catalog.stats().unwrap().used_bytes, 0);

    harness.add(3, "C").await;
    assert!(
        harness
            .wait_for_state(&c, EntityState::Active, Duration::from_secs(5))
            .await
    );
    assert_eq!(harness.catalog.stats().unwrap().used_bytes, 500);

    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_remove_stops_estimator() {
    let harness = TestHarness::new(10_000);
    let hash = fixtures::hash(1);
    harness.engine.set_metadata(&hash, "movie.mkv", 1000).await;
    harness.engine.set_progress_script(&hash, vec![(100, 1000)]).await;

    harness.add(1, "Movie").await;
    assert!(
        harness
            .wait_for_state(&hash, EntityState::Active, Duration::from_secs(5))
            .await
    );
    tokio::time::sleep(Duration::from_millis(30)).await;

    let mut sub = harness.orchestrator.bus().subscribe();
    let removed = harness.orchestrator.request_remove(&hash).await.unwrap();
    assert_eq!(removed.key, hash);

    let change = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.kind, ChangeKind::Removed);

    // Nothing samples the engine or publishes for the key afterwards
    let samples = harness.engine.samples_taken(&hash).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.engine.samples_taken(&hash).await, samples);
    assert!(sub.try_recv().is_err());
    assert!(!harness.catalog.exists(&hash));
}

#[tokio::test]
async fn test_subscribers_share_the_feed() {
    let harness = TestHarness::new(10_000);
    let first = harness.add(1, "Before").await;

    let (snapshot, mut sub1) = harness.orchestrator.subscribe().unwrap();
    let (_, mut sub2) = harness.orchestrator.subscribe().unwrap();
    assert!(snapshot.get(&first).is_some());

    let second = harness.add(2, "After").await;

    for sub in [&mut sub1, &mut sub2] {
        let change = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.kind, ChangeKind::EntityAdded);
        assert_eq!(change.key, second);
    }

    drop(sub2);
    assert_eq!(harness.orchestrator.status().await.subscribers, 1);
}

#[tokio::test]
async fn test_catalog_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let snapshot = temp_dir.path().join("catalog.json");
    let storage = temp_dir.path().join("storage");
    let hash = fixtures::hash(1);

    {
        let catalog = Arc::new(CatalogStore::load(&snapshot, &storage, 10_000).unwrap());
        let engine = MockTransferEngine::new();
        engine.set_metadata(&hash, "movie.mkv", 700).await;
        engine.set_progress_script(&hash, vec![(700, 700)]).await;

        let orchestrator = Orchestrator::new(
            OrchestratorConfig {
                sample_interval_ms: 5,
                velocity_window: 3,
                metadata_timeout_secs: 5,
            },
            Arc::clone(&catalog),
            EventBus::new(16),
            Arc::new(engine),
            None,
        );
        let mut sub = orchestrator.bus().subscribe();
        orchestrator
            .request_add("Movie", &fixtures::magnet(&hash))
            .await
            .unwrap();
        collect_until(&mut sub, &hash, ChangeKind::Completed).await;
        orchestrator.shutdown().await;
    }

    let reloaded = CatalogStore::load(&snapshot, &storage, 10_000).unwrap();
    let record = reloaded.get(&hash).unwrap();
    assert_eq!(record.state, EntityState::Done);
    assert_eq!(record.size_bytes, 700);
    assert_eq!(reloaded.stats().unwrap().used_bytes, 700);
}
