//! Common test utilities for E2E testing with mocks.
//!
//! Builds an in-process router over a real catalog in a temp directory, a
//! real orchestrator and a [`MockTransferEngine`], so tests can drive whole
//! acquisitions without a torrent session.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use swatchr_core::{
    create_audit_system, AuditStore, CatalogService, CatalogStore, EventBus, Orchestrator,
    SqliteAuditStore,
};
use swatchr_core::testing::MockTransferEngine;

/// Re-export fixtures for test convenience
pub use swatchr_core::testing::fixtures;

/// Test fixture for E2E testing with a mock transfer engine.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_entity_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/entities", json!({
///         "title": "Movie",
///         "descriptor": fixtures::magnet(&fixtures::hash(1)),
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock engine - configure metadata and progress per key
    pub engine: MockTransferEngine,
    /// The orchestrator behind the router
    pub orchestrator: Arc<Orchestrator>,
    /// Audit store the router queries
    pub audit_store: Arc<dyn AuditStore>,
    /// Temporary directory for catalog, storage and audit database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with a 1 MiB quota.
    pub async fn new() -> Self {
        Self::with_quota_mb(1).await
    }

    /// Create a test fixture with the given quota.
    pub async fn with_quota_mb(quota_mb: u64) -> Self {
        Self::build(quota_mb, None).await
    }

    /// Create a test fixture whose change feed queues hold `capacity` changes.
    pub async fn with_subscriber_capacity(capacity: usize) -> Self {
        Self::build(1, Some(capacity)).await
    }

    async fn build(quota_mb: u64, subscriber_capacity: Option<usize>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = fixtures::config(temp_dir.path(), quota_mb);
        if let Some(capacity) = subscriber_capacity {
            config.events.subscriber_capacity = capacity;
        }

        let catalog = Arc::new(
            CatalogStore::load(
                &config.storage.catalog_path,
                &config.storage.storage_path,
                config.storage.quota_bytes(),
            )
            .expect("Failed to load catalog"),
        );

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&config.database.path).expect("Failed to create audit store"),
        );
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let engine = MockTransferEngine::new();
        let orchestrator = Arc::new(Orchestrator::new(
            config.orchestrator.clone(),
            catalog,
            EventBus::new(config.events.subscriber_capacity),
            Arc::new(engine.clone()),
            Some(audit_handle),
        ));

        let state = Arc::new(swatchr_server::AppState::new(
            config,
            Arc::clone(&orchestrator) as Arc<dyn CatalogService>,
            Arc::clone(&audit_store),
        ));

        let router = swatchr_server::create_router(state);

        Self {
            router,
            engine,
            orchestrator,
            audit_store,
            temp_dir,
        }
    }

    /// Serve the router on an ephemeral local port, for clients that need a
    /// real socket (WebSocket).
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        addr
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a GET request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll `GET /api/v1/entities/{key}` until the entity reaches `state`.
    pub async fn wait_for_state(&self, key: &str, state: &str) -> Value {
        let path = format!("/api/v1/entities/{}", key);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.get(&path).await;
            if response.body["state"] == state {
                return response.body;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "entity {} never reached {}, last: {}",
                key,
                state,
                response.body
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll the audit endpoint until `event_type` appears for `key`.
    pub async fn wait_for_audit(&self, key: &str, event_type: &str) -> Value {
        let path = format!("/api/v1/audit?key={}&event_type={}", key, event_type);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.get(&path).await;
            if response.body["total"].as_i64().unwrap_or(0) > 0 {
                return response.body;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "audit event {} never recorded for {}",
                event_type,
                key
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
