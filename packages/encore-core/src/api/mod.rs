//! HTTP/WebSocket API layer.
//!
//! Handlers are thin and delegate to the session registry, the command router
//! and the relay hub.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bootstrap::BootstrappedServices;
use crate::config::Config;
use crate::constants::{PORT_RANGE_END, PORT_RANGE_START};
use crate::events::BroadcastEventBridge;
use crate::relay::{RelayGateway, RelayHub};
use crate::services::{CommandRouter, SessionRegistry};

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions keyed by destination.
    pub registry: Arc<SessionRegistry>,
    /// Text command dispatch.
    pub router: Arc<CommandRouter>,
    /// Relay mounts that listeners attach to.
    pub hub: Arc<RelayHub>,
    /// Decides which destinations may be joined.
    pub gateway: Arc<RelayGateway>,
    /// Source of events for `/ws` clients.
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(services: &BootstrappedServices, config: Arc<Config>) -> Self {
        Self {
            registry: Arc::clone(&services.registry),
            router: Arc::clone(&services.router),
            hub: Arc::clone(&services.hub),
            gateway: Arc::clone(&services.gateway),
            event_bridge: Arc::clone(&services.event_bridge),
            ws_manager: Arc::clone(&services.ws_manager),
            config,
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the configured port, or the first free one in the default range.
pub async fn bind_listener(
    preferred_port: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        Ok((preferred_port, tokio::net::TcpListener::bind(&addr).await?))
    } else {
        find_available_port(PORT_RANGE_START, PORT_RANGE_END).await
    }
}

/// CORS restricted to the configured origin prefixes.
///
/// Relay listeners fetch audio without an `Origin` header, so this only
/// affects browser callers.
fn cors_layer(trusted_origins: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let origin = origin.to_str().unwrap_or("");
            trusted_origins
                .iter()
                .any(|allowed| origin.starts_with(allowed.as_str()))
        }))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(false)
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let (port, listener) = bind_listener(state.config.preferred_port).await?;
    serve(state, port, listener).await
}

/// Serves on an already-bound listener.
pub async fn serve(
    state: AppState,
    port: u16,
    listener: tokio::net::TcpListener,
) -> Result<(), ServerError> {
    log::info!("[Server] Listening on http://0.0.0.0:{}", port);
    log::info!(
        "[Server] CORS trusted origins: {:?}",
        state.config.trusted_origins
    );

    let cors = cors_layer(state.config.trusted_origins.clone());
    let app = http::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // ConnectInfo labels relay listeners by peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
