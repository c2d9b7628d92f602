use axum::Json;
use chrono::Utc;
use serde_json::{Value, json};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now(),
    }))
}
