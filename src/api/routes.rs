use crate::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Build the API router. All routes are mounted under `/api` by the caller.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(crate::api::handlers::health::health))
        .route(
            "/research",
            post(crate::api::handlers::research::start_research),
        )
        .route(
            "/research/{id}",
            get(crate::api::handlers::research::get_research),
        )
        .route(
            "/research/{id}/threads",
            get(crate::api::handlers::research::get_research_threads),
        )
        .route(
            "/research/{id}/cancel",
            post(crate::api::handlers::research::cancel_research),
        )
}
