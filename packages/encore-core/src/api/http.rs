//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use std::net::SocketAddr;
use std::pin::Pin;

use axum::{
    body::Body,
    extract::{connect_info::ConnectInfo, Path, State},
    http::header,
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::response::{api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::constants::{APP_NAME, RELAY_CONTENT_TYPE, SERVICE_ID};
use crate::error::{EncoreError, EncoreResult};
use crate::services::CommandContext;
use crate::utils::validate_destination_id;

/// Boxed stream type for relayed audio.
type AudioStream = Pin<Box<dyn futures::Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandRequest {
    actor: String,
    #[serde(default)]
    actor_destination: Option<String>,
    text: String,
}

#[derive(Debug, Serialize)]
struct CommandResponse {
    /// False when the text was not a command.
    handled: bool,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/destinations", get(list_destinations))
        .route("/api/destinations/{id}", delete(teardown_destination))
        .route("/api/destinations/{id}/queue", get(get_queue))
        .route("/api/destinations/{id}/commands", post(handle_command))
        .route("/stream/{id}/live", get(stream_audio))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Rejects identifiers that could never name a destination.
fn parse_destination(id: &str) -> EncoreResult<&str> {
    validate_destination_id(id)
        .map(|()| id)
        .map_err(|e| EncoreError::InvalidRequest(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "sessions": state.registry.len(),
        "eventClients": state.ws_manager.connection_count(),
    }))
}

async fn list_destinations(State(state): State<AppState>) -> Json<Value> {
    let snapshots = state.registry.snapshots().await;
    api_success(json!({ "destinations": snapshots }))
}

async fn get_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EncoreResult<Json<Value>> {
    let destination = parse_destination(&id)?;
    let session = state
        .registry
        .get(destination)
        .ok_or_else(|| EncoreError::SessionNotFound(id.clone()))?;
    let snapshot = session.controller().snapshot().await;
    Ok(api_success(snapshot))
}

async fn handle_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CommandRequest>,
) -> EncoreResult<Json<Value>> {
    let destination = parse_destination(&id)?;
    if !state.gateway.accepts(destination) {
        return Err(EncoreError::Forbidden(format!(
            "{destination} is not a configured destination"
        )));
    }

    let ctx = CommandContext {
        actor: payload.actor,
        actor_destination: payload.actor_destination,
        destination: destination.to_string(),
    };

    let response = match state.router.dispatch(&ctx, &payload.text).await {
        Some(reply) => CommandResponse {
            handled: true,
            ok: reply.ok,
            reply: Some(reply.text),
        },
        None => CommandResponse {
            handled: false,
            ok: true,
            reply: None,
        },
    };
    Ok(api_success(response))
}

async fn teardown_destination(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EncoreResult<Json<Value>> {
    let destination = parse_destination(&id)?;
    if state.registry.teardown(destination).await {
        Ok(api_ok())
    } else {
        Err(EncoreError::SessionNotFound(id.clone()))
    }
}

/// Streams a destination's relayed audio to one listener.
///
/// The listener counts toward the destination's presence for as long as the
/// response body is alive. The body ends when the session is torn down.
async fn stream_audio(
    Path(id): Path<String>,
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> EncoreResult<Response> {
    let destination = parse_destination(&id)?.to_string();
    let (rx, guard) = state
        .hub
        .subscribe(&destination, remote_addr.to_string())
        .ok_or_else(|| EncoreError::SessionNotFound(destination.clone()))?;

    log::info!(
        "[Stream] Listener {} joined {}",
        remote_addr,
        destination
    );

    let closed = guard.closed();
    let stream: AudioStream = Box::pin(
        BroadcastStream::new(rx)
            .filter_map(move |res| {
                // Owning the guard here ties the listener registration to the body.
                let _guard = &guard;
                let item = match res {
                    Ok(chunk) => Some(Ok::<Bytes, std::io::Error>(chunk)),
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        log::warn!(
                            "[Stream] Listener {} on {} lagged by {} chunks",
                            remote_addr,
                            destination,
                            n
                        );
                        None
                    }
                };
                futures::future::ready(item)
            })
            .take_until(closed),
    );

    Response::builder()
        .header(header::CONTENT_TYPE, RELAY_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("icy-name", APP_NAME)
        .body(Body::from_stream(stream))
        .map_err(|e| EncoreError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;

    use super::*;
    use crate::bootstrap::bootstrap_services;
    use crate::config::Config;

    fn state() -> AppState {
        let mut config = Config::default();
        config.relay.destinations = vec!["lounge".into()];
        let services = bootstrap_services(&config).unwrap();
        AppState::new(&services, Arc::new(config))
    }

    fn command(actor_destination: Option<&str>, text: &str) -> Json<CommandRequest> {
        Json(CommandRequest {
            actor: "alice".into(),
            actor_destination: actor_destination.map(String::from),
            text: text.into(),
        })
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo("127.0.0.1:50123".parse().unwrap())
    }

    #[test]
    fn parse_destination_rejects_bad_ids() {
        assert!(parse_destination("lounge").is_ok());
        assert!(matches!(
            parse_destination("no spaces"),
            Err(EncoreError::InvalidRequest(_))
        ));
    }

    #[test]
    fn command_response_omits_missing_reply() {
        let json = serde_json::to_value(CommandResponse {
            handled: false,
            ok: true,
            reply: None,
        })
        .unwrap();
        assert_eq!(json, json!({ "handled": false, "ok": true }));
    }

    #[tokio::test]
    async fn queue_of_unbound_destination_is_not_found() {
        let err = get_queue(State(state()), Path("lounge".into()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn command_to_unlisted_destination_is_forbidden() {
        let err = handle_command(
            State(state()),
            Path("garage".into()),
            command(Some("garage"), "!queue"),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn plain_text_is_not_handled() {
        let Json(body) = handle_command(
            State(state()),
            Path("lounge".into()),
            command(Some("lounge"), "hello there"),
        )
        .await
        .unwrap();
        assert_eq!(body["handled"], false);
        assert!(body.get("reply").is_none());
    }

    #[tokio::test]
    async fn queue_command_on_idle_destination_replies_empty() {
        let Json(body) = handle_command(
            State(state()),
            Path("lounge".into()),
            command(Some("lounge"), "!queue"),
        )
        .await
        .unwrap();
        assert_eq!(body["handled"], true);
        assert_eq!(body["ok"], false);
        assert_eq!(body["reply"], "The queue is empty.");
    }

    #[tokio::test]
    async fn teardown_of_unbound_destination_is_not_found() {
        let err = teardown_destination(State(state()), Path("lounge".into()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bound_destination_is_listed_and_torn_down() {
        let state = state();
        state.registry.bind("lounge").await.unwrap();

        let Json(body) = list_destinations(State(state.clone())).await;
        assert_eq!(body["destinations"][0]["destination"], "lounge");

        let Json(queue) = get_queue(State(state.clone()), Path("lounge".into()))
            .await
            .unwrap();
        assert_eq!(queue["state"], "idle");

        assert!(teardown_destination(State(state.clone()), Path("lounge".into()))
            .await
            .is_ok());
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn listening_requires_a_bound_session() {
        let state = state();
        let err = stream_audio(Path("lounge".into()), State(state.clone()), peer())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        state.registry.bind("lounge").await.unwrap();
        let response = stream_audio(Path("lounge".into()), State(state.clone()), peer())
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            RELAY_CONTENT_TYPE
        );
        assert_eq!(state.hub.get("lounge").unwrap().listener_count(), 1);

        drop(response);
        assert_eq!(state.hub.get("lounge").unwrap().listener_count(), 0);
    }
}
