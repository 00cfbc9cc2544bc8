//! Application bootstrap and dependency wiring.
//!
//! This module is the composition root: the single place where services are
//! instantiated and wired together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::WsConnectionManager;
use crate::config::Config;
use crate::error::{EncoreError, EncoreResult};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::media::{MediaSource, YtDlpSource};
use crate::relay::{RelayGateway, RelayHub};
use crate::runtime::TokioSpawner;
use crate::services::{CommandRouter, SessionRegistry, SessionSettings};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Live sessions keyed by destination.
    pub registry: Arc<SessionRegistry>,
    /// Text command dispatch over the registry.
    pub router: Arc<CommandRouter>,
    /// Relay mounts for listeners.
    pub hub: Arc<RelayHub>,
    /// Joins relay mounts and reports their listeners.
    pub gateway: Arc<RelayGateway>,
    /// Resolves queries and opens audio streams.
    pub media: Arc<dyn MediaSource>,
    /// Event bridge feeding `/ws` clients.
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub spawner: TokioSpawner,
    /// Parent of every session's token.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Stops every session and disconnects every client.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        let sessions = self.registry.shutdown().await;
        log::info!("[Bootstrap] Stopped {} session(s)", sessions);

        let mounts = self.hub.close_all();
        if mounts > 0 {
            log::info!("[Bootstrap] Closed {} leftover relay mount(s)", mounts);
        }

        let connections = self.ws_manager.close_all();
        if connections > 0 {
            log::info!("[Bootstrap] Closed {} WebSocket connection(s)", connections);
        }

        self.cancel_token.cancel();
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all application services with their dependencies.
///
/// Wiring order:
///
/// 1. Shared infrastructure (spawner, event bridge, cancellation token)
/// 2. Relay hub and gateway
/// 3. Media source
/// 4. Session registry (depends on gateway, media, event bridge)
/// 5. Command router (depends on registry)
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`EncoreError::Configuration`] if `config` fails validation.
pub fn bootstrap_services(config: &Config) -> EncoreResult<BootstrappedServices> {
    config.validate().map_err(EncoreError::Configuration)?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));

    let ws_manager = Arc::new(WsConnectionManager::new());

    let hub = Arc::new(RelayHub::new(config.relay.channel_capacity));
    let gateway = Arc::new(RelayGateway::new(
        Arc::clone(&hub),
        &config.relay,
        spawner.clone(),
    ));

    let media: Arc<dyn MediaSource> = Arc::new(YtDlpSource::new(config.media.clone()));

    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&gateway),
        Arc::clone(&media),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        SessionSettings::from_config(config),
        spawner.clone(),
        cancel_token.child_token(),
    ));

    let router = Arc::new(CommandRouter::new(
        Arc::clone(&registry),
        config.command_prefix.clone(),
    ));

    log::info!(
        "[Bootstrap] Services ready (prefix '{}', presence every {}s, {} allowed destination(s))",
        config.command_prefix,
        config.presence_interval_secs,
        config.relay.destinations.len()
    );

    Ok(BootstrappedServices {
        registry,
        router,
        hub,
        gateway,
        media,
        event_bridge,
        ws_manager,
        spawner,
        cancel_token,
    })
}
