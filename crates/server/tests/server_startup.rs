//! Tests that spawn the `swatchr` binary against a temp config.

use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A minimal valid config rooted in `dir`
fn minimal_config(port: u16, dir: &Path) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {port}

[storage]
catalog_path = "{catalog}"
storage_path = "{storage}"
quota_mb = 100

[database]
path = "{db}"

[torrent_client.librqbit]
enable_dht = false
"#,
        port = port,
        catalog = dir.join("catalog.json").display(),
        storage = dir.join("storage").display(),
        db = dir.join("audit.db").display(),
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_swatchr"))
        .env("SWATCHR_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Next text frame from the feed, as JSON
async fn next_json(
    socket: &mut WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
) -> serde_json::Value {
    loop {
        let message = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for message")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("message is not JSON");
        }
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let port = get_available_port();
    let dir = TempDir::new().unwrap();
    let config = write_config(&minimal_config(port, dir.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    server.kill().await.ok();
}

#[tokio::test]
async fn test_startup_writes_catalog_snapshot() {
    let port = get_available_port();
    let dir = TempDir::new().unwrap();
    let config = write_config(&minimal_config(port, dir.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    assert!(dir.path().join("catalog.json").exists());
    assert!(dir.path().join("storage").is_dir());
    assert!(dir.path().join("audit.db").exists());

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/catalog/stats", port))
        .send()
        .await
        .expect("Failed to send request");
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["quota_bytes"], 100 * 1024 * 1024);
    assert_eq!(json["total_entities"], 0);

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_swatchr"))
            .env("SWATCHR_CONFIG", "/nonexistent/config.toml")
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_missing_storage_section_exits_with_error() {
    let config = write_config(
        r#"
[server]
port = 8080
"#,
    );

    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_swatchr"))
            .env("SWATCHR_CONFIG", config.path())
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_zero_quota_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &minimal_config(get_available_port(), dir.path())
            .replace("quota_mb = 100", "quota_mb = 0"),
    );

    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_swatchr"))
            .env("SWATCHR_CONFIG", config.path())
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_updates_socket_sends_snapshot_then_changes() {
    let port = get_available_port();
    let dir = TempDir::new().unwrap();
    let config = write_config(&minimal_config(port, dir.path()));
    let existing = "1".repeat(40);
    let added = "2".repeat(40);

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let client = Client::new();
    let add = |hash: &str| {
        client
            .post(format!("http://127.0.0.1:{}/api/v1/entities", port))
            .json(&serde_json::json!({
                "title": format!("Item {}", &hash[..4]),
                "descriptor": format!("magnet:?xt=urn:btih:{}", hash),
            }))
            .send()
    };
    assert_eq!(add(&existing).await.unwrap().status(), 201);

    let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{}/api/v1/updates", port))
        .await
        .expect("Failed to connect WebSocket");

    let snapshot = next_json(&mut socket).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["quota_bytes"], 100 * 1024 * 1024);
    assert_eq!(snapshot["records"][0]["key"], existing.as_str());

    assert_eq!(add(&added).await.unwrap().status(), 201);

    // The first entity may report on its own metadata meanwhile
    let change = loop {
        let message = next_json(&mut socket).await;
        assert_eq!(message["type"], "change");
        if message["key"] == added.as_str() {
            break message;
        }
    };
    assert_eq!(change["kind"], "entity_added");

    server.kill().await.ok();
}
