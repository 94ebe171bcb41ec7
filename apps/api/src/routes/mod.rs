pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::screening::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/screenings",
            post(handlers::handle_submit).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/screenings/:id", get(handlers::handle_status))
        .route("/api/v1/screenings/:id/report", get(handlers::handle_report))
        .with_state(state)
}
