use axum::{Json, Router, http::StatusCode, routing::get};
use serde_json::{Value, json};

/// Liveness endpoints.
pub fn root_router() -> Router {
    Router::new().route("/", get(index).head(head_index))
}

async fn index() -> Json<Value> {
    Json(json!({}))
}

async fn head_index() -> StatusCode {
    StatusCode::OK
}
