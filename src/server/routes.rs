use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/api/auth/session", post(handlers::create_session))
        .route("/api/auth/me", get(handlers::me))
        .route("/api/auth/logout", post(handlers::logout))
        // Quota
        .route("/api/usage", get(handlers::usage))
        // Assessments (quota-gated)
        .route("/api/assessments", post(handlers::create_assessment))
        .route(
            "/api/assessments/:assessment_id",
            get(handlers::get_assessment),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
