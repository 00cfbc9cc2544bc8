//! Destination gateway for relay mounts.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{RelayChannel, RelayHub, RelaySink};
use crate::config::RelayConfig;
use crate::runtime::TokioSpawner;
use crate::sink::{
    DestinationConnector, Occupant, PresenceError, PresenceResult, PresenceSource, SinkBinding,
    SinkError, SinkResult,
};
use crate::utils::validate_destination_id;

/// Joins relay mounts and reports their listeners.
pub struct RelayGateway {
    hub: Arc<RelayHub>,
    /// Channel each joined destination was given.
    mounts: DashMap<String, Arc<RelayChannel>>,
    /// Accepted destinations; empty accepts any valid identifier.
    allowed: HashSet<String>,
    bitrate_kbps: u32,
    spawner: TokioSpawner,
}

impl RelayGateway {
    pub fn new(hub: Arc<RelayHub>, config: &RelayConfig, spawner: TokioSpawner) -> Self {
        Self {
            hub,
            mounts: DashMap::new(),
            allowed: config.destinations.iter().cloned().collect(),
            bitrate_kbps: config.bitrate_kbps,
            spawner,
        }
    }

    /// Whether `destination` may be joined.
    pub fn accepts(&self, destination: &str) -> bool {
        validate_destination_id(destination).is_ok()
            && (self.allowed.is_empty() || self.allowed.contains(destination))
    }
}

#[async_trait]
impl DestinationConnector for RelayGateway {
    async fn connect(&self, destination: &str) -> SinkResult<SinkBinding> {
        if let Err(reason) = validate_destination_id(destination) {
            return Err(SinkError::Unreachable(reason.to_string()));
        }
        if !self.accepts(destination) {
            return Err(SinkError::Unreachable(format!(
                "{destination} is not a configured destination"
            )));
        }

        let channel = self.hub.open(destination);
        self.mounts
            .insert(destination.to_string(), Arc::clone(&channel));
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = RelaySink::new(
            destination,
            channel,
            tx,
            self.bitrate_kbps,
            self.spawner.clone(),
        );

        log::info!("[Relay] Opened mount {}", destination);
        Ok(SinkBinding {
            sink: Arc::new(sink),
            events: rx,
        })
    }

    async fn disconnect(&self, destination: &str) {
        match self.mounts.remove(destination) {
            Some((_, channel)) => {
                self.hub.close_channel(destination, &channel);
            }
            None => {
                self.hub.close(destination);
            }
        }
    }
}

#[async_trait]
impl PresenceSource for RelayGateway {
    async fn occupants(&self, destination: &str) -> PresenceResult<Vec<Occupant>> {
        match self.hub.get(destination) {
            Some(channel) if !channel.is_closed() => Ok(channel.occupants()),
            _ => Err(PresenceError::DestinationGone(format!(
                "relay mount {destination} is not open"
            ))),
        }
    }
}
