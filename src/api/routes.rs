use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Conversations
        .route("/api/conversation/start", post(handlers::start_conversation))
        .route(
            "/api/conversation/:session_id/history",
            get(handlers::conversation_history),
        )
        .route(
            "/api/conversation/:session_id",
            delete(handlers::delete_conversation),
        )
        // Recommendations
        .route("/api/recommendation", post(handlers::recommend))
        // Cinemas
        .route("/api/cinemas", get(handlers::list_cinemas))
        .route(
            "/api/cinemas/:postal_code",
            get(handlers::cinemas_by_postal_code),
        )
        // Admin
        .route("/api/admin/refresh", post(handlers::refresh_catalog))
        .route("/api/admin/stats", get(handlers::catalog_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
