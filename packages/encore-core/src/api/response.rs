//! Uniform JSON response helpers.
//!
//! Successful responses carry `"success": true` merged into the payload.
//! Failures go through [`EncoreError`](crate::error::EncoreError)'s
//! `IntoResponse` impl.

use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// Wraps a payload in a success envelope.
///
/// Object payloads gain a `success` field; anything else is nested under `data`.
pub fn api_success<T: Serialize>(payload: T) -> Json<Value> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(mut map)) => {
            map.insert("success".to_string(), Value::Bool(true));
            Json(Value::Object(map))
        }
        Ok(other) => Json(json!({ "success": true, "data": other })),
        Err(e) => {
            log::error!("[Server] Failed to serialize response: {}", e);
            Json(json!({ "success": false, "error": "serialization_failed" }))
        }
    }
}

/// Success envelope with no payload.
pub fn api_ok() -> Json<Value> {
    Json(json!({ "success": true }))
}
