use axum::Json;
use serde_json::{Value, json};

/// Health check.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is healthy")),
    tag = "health"
)]
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
