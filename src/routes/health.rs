use crate::{error::AuthError, server::Server};
use axum::{Router, extract::State, response::Json, routing::get};
use serde_json::Value;

pub fn create_health_routes() -> Router<Server> {
    Router::new().route("/health", get(health_handler))
}

async fn health_handler(State(server): State<Server>) -> Result<Json<Value>, AuthError> {
    let report = server.health_service.check_health().await;
    let json = serde_json::to_value(&report)
        .map_err(|e| AuthError::Internal(format!("health report serialization: {e}")))?;
    Ok(Json(json))
}
