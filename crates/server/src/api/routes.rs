use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use super::{audit, compat, entities, handlers, middleware::metrics_middleware, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Entities
        .route(
            "/entities",
            get(entities::list_entities).post(entities::create_entity),
        )
        .route(
            "/entities/{key}",
            get(entities::get_entity).delete(entities::remove_entity),
        )
        .route("/entities/{key}/pause", post(entities::pause_entity))
        .route("/entities/{key}/resume", post(entities::resume_entity))
        .route("/catalog/stats", get(entities::get_stats))
        // Change feed
        .route("/updates", get(ws::ws_handler))
        // Audit
        .route("/audit", get(audit::query_audit));

    // Browser extension routes
    let compat_routes = Router::new()
        .route("/ping", get(compat::ping))
        .route("/add", post(compat::add))
        .route("/remove", post(compat::remove))
        .route("/updates", get(ws::ws_handler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .merge(compat_routes)
        .route("/metrics", get(handlers::metrics));

    // Serve the web UI with SPA fallback
    if let Some(static_dir) = state.config().server.static_dir.clone() {
        let index_path = static_dir.join("index.html");
        let serve_dir = ServeDir::new(&static_dir).fallback(ServeFile::new(index_path));
        router = router.fallback_service(serve_dir);
    }

    router
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
