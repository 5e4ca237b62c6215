use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swatchr_core::{
    config::TorrentClientBackend, create_audit_system, load_config, validate_config, AuditEvent,
    AuditStore, CatalogService, CatalogStore, EventBus, LibrqbitEngine, Orchestrator,
    SqliteAuditStore, TransferEngine,
};
use swatchr_server::{create_router, AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SWATCHR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Storage path: {:?}", config.storage.storage_path);
    info!("Quota: {} MiB", config.storage.quota_mb);
    info!("Database path: {:?}", config.database.path);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Load the catalog, seeding it from the storage directory on first run
    let catalog = Arc::new(
        CatalogStore::load(
            &config.storage.catalog_path,
            &config.storage.storage_path,
            config.storage.quota_bytes(),
        )
        .context("Failed to load catalog")?,
    );
    info!("Catalog loaded from {:?}", catalog.snapshot_path());

    // Create SQLite audit store
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;
    info!("Emitted ServiceStarted audit event");

    // Create transfer engine
    let engine: Arc<dyn TransferEngine> = match config.torrent_client.backend {
        TorrentClientBackend::Librqbit => {
            info!(
                "Initializing embedded librqbit session (storage path: {:?})",
                config.storage.storage_path
            );
            Arc::new(
                LibrqbitEngine::new(
                    &config.torrent_client.librqbit,
                    &config.storage.storage_path,
                )
                .await
                .context("Failed to initialize librqbit session")?,
            )
        }
    };

    let bus = EventBus::new(config.events.subscriber_capacity);

    let orchestrator = Arc::new(Orchestrator::new(
        config.orchestrator.clone(),
        Arc::clone(&catalog),
        bus,
        engine,
        Some(audit_handle.clone()),
    ));

    let recovered = orchestrator.recover().await;
    info!("Orchestrator started ({} transfers resumed)", recovered);

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&orchestrator) as Arc<dyn CatalogService>,
        audit_store,
    ));

    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    orchestrator.shutdown().await;

    if let Err(e) = catalog.save() {
        error!("Failed to save catalog on shutdown: {}", e);
    }

    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle is gone. The orchestrator holds a clone.
    drop(orchestrator);
    drop(audit_handle);

    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
