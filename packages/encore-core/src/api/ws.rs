//! WebSocket handler for the live event stream.
//!
//! Clients receive an initial snapshot of every session, then every
//! [`BroadcastEvent`](crate::events::BroadcastEvent) as JSON. They may also
//! issue commands and queue lookups over the same socket.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;
use crate::constants::{WS_HEARTBEAT_CHECK_INTERVAL_SECS, WS_HEARTBEAT_TIMEOUT_SECS};
use crate::error::{EncoreError, EncoreResult};
use crate::services::{CommandContext, QueueSnapshot};
use crate::utils::validate_destination_id;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming WebSocket message envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsIncoming {
    Heartbeat,
    Command { payload: WsCommandRequest },
    GetQueue { payload: WsDestinationRequest },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsCommandRequest {
    destination: String,
    actor: String,
    #[serde(default)]
    actor_destination: Option<String>,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsDestinationRequest {
    destination: String,
}

/// Outgoing WebSocket messages.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    HeartbeatAck,
    Error { message: String },
    InitialState { payload: InitialStatePayload },
    CommandReply { payload: CommandReplyPayload },
    QueueState { payload: QueueSnapshot },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitialStatePayload {
    destinations: Vec<QueueSnapshot>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandReplyPayload {
    destination: String,
    handled: bool,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<String>,
}

impl WsOutgoing {
    /// Serializes the message to a WebSocket text message.
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

/// Sends `response_fn(value)` on success, or an `ERROR` message.
async fn send_result<T, E, R>(
    sender: &mut SplitSink<WebSocket, Message>,
    result: Result<T, E>,
    response_fn: R,
) where
    E: std::fmt::Display,
    R: FnOnce(T) -> WsOutgoing,
{
    let outgoing = match result {
        Ok(value) => response_fn(value),
        Err(e) => WsOutgoing::Error {
            message: e.to_string(),
        },
    };
    if let Some(msg) = outgoing.to_message() {
        let _ = sender.send(msg).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn build_initial_state(state: &AppState) -> Option<Message> {
    WsOutgoing::InitialState {
        payload: InitialStatePayload {
            destinations: state.registry.snapshots().await,
        },
    }
    .to_message()
}

async fn handle_command(
    state: &AppState,
    req: WsCommandRequest,
) -> EncoreResult<CommandReplyPayload> {
    validate_destination_id(&req.destination)
        .map_err(|e| EncoreError::InvalidRequest(e.to_string()))?;
    if !state.gateway.accepts(&req.destination) {
        return Err(EncoreError::Forbidden(format!(
            "{} is not a configured destination",
            req.destination
        )));
    }

    let ctx = CommandContext {
        actor: req.actor,
        actor_destination: req.actor_destination,
        destination: req.destination,
    };
    let reply = state.router.dispatch(&ctx, &req.text).await;

    Ok(CommandReplyPayload {
        destination: ctx.destination,
        handled: reply.is_some(),
        ok: reply.as_ref().map_or(true, |r| r.ok),
        reply: reply.map(|r| r.text),
    })
}

async fn handle_get_queue(state: &AppState, destination: &str) -> EncoreResult<QueueSnapshot> {
    let session = state
        .registry
        .get(destination)
        .ok_or_else(|| EncoreError::SessionNotFound(destination.to_string()))?;
    Ok(session.controller().snapshot().await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Loop
// ─────────────────────────────────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, peer))
}

async fn handle_ws(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before the snapshot so no event falls between the two.
    let mut broadcast_rx = state.event_bridge.subscribe();
    let mut last_activity = Instant::now();

    let conn_guard = state.ws_manager.register(peer);
    let cancel_token = conn_guard.cancel_token().clone();

    if let Some(msg) = build_initial_state(&state).await {
        if sender.send(msg).await.is_err() {
            log::warn!("[WS] Failed to send initial state, client disconnected");
            return;
        }
    }

    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_secs(WS_HEARTBEAT_CHECK_INTERVAL_SECS));
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: ws-{}", conn_guard.id());
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsIncoming>(&text) {
                            Ok(WsIncoming::Heartbeat) => {
                                if let Some(msg) = WsOutgoing::HeartbeatAck.to_message() {
                                    let _ = sender.send(msg).await;
                                }
                            }
                            Ok(WsIncoming::Command { payload }) => {
                                let result = handle_command(&state, payload).await;
                                send_result(&mut sender, result, |payload| {
                                    WsOutgoing::CommandReply { payload }
                                })
                                .await;
                            }
                            Ok(WsIncoming::GetQueue { payload }) => {
                                let result = handle_get_queue(&state, &payload.destination).await;
                                send_result(&mut sender, result, |payload| {
                                    WsOutgoing::QueueState { payload }
                                })
                                .await;
                            }
                            Err(e) => {
                                log::debug!("[WS] Ignoring malformed message: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            event = broadcast_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("[WS] ws-{} missed {} event(s)", conn_guard.id(), n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(WS_HEARTBEAT_TIMEOUT_SECS) {
                    log::warn!("[WS] Heartbeat timeout: ws-{}", conn_guard.id());
                    break;
                }
            }
        }
    }
}
