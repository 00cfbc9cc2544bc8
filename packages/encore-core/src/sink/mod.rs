//! Output destinations: playback sinks and listener presence.
//!
//! A destination is anywhere audio can be delivered (a voice channel, an HTTP
//! relay mount). Joining one yields a [`PlaybackSink`] plus a channel of
//! [`SinkEvent`]s; occupancy is read through a [`PresenceSource`].

mod traits;

pub use traits::{DestinationConnector, DestinationGateway, PlaybackSink, PresenceSource};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use std::sync::Arc;

/// Observable state of a playback sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkState {
    /// Nothing is being rendered.
    #[default]
    Idle,
    /// A stream is being rendered.
    Playing,
    /// A stream is loaded but held.
    Paused,
    /// The last stream failed.
    Error,
}

/// Notifications a sink sends back to its controller.
///
/// Every event carries the playback ID passed to [`PlaybackSink::play`], so a
/// controller can discard events that belong to a stream it already replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// The stream finished naturally.
    Idle {
        /// Playback the event belongs to.
        playback_id: u64,
    },
    /// The stream failed mid-playback.
    Error {
        /// Playback the event belongs to.
        playback_id: u64,
        /// Description of the failure.
        message: String,
    },
}

impl SinkEvent {
    /// Returns the playback ID the event belongs to.
    pub fn playback_id(&self) -> u64 {
        match self {
            Self::Idle { playback_id } | Self::Error { playback_id, .. } => *playback_id,
        }
    }
}

/// Live handle to a joined destination.
pub struct SinkBinding {
    /// The sink audio is handed to.
    pub sink: Arc<dyn PlaybackSink>,
    /// State-change events from the sink.
    pub events: mpsc::UnboundedReceiver<SinkEvent>,
}

/// Someone present at a destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupant {
    /// Stable identifier of the occupant.
    pub id: String,
    /// Whether the occupant is a bot/operator rather than a listener.
    pub is_operator: bool,
}

impl Occupant {
    /// Creates a listener occupant.
    pub fn listener(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_operator: false,
        }
    }

    /// Creates an operator occupant.
    pub fn operator(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_operator: true,
        }
    }
}

/// Errors raised by sinks and destination connectors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination no longer exists or cannot be reached.
    #[error("Destination unreachable: {0}")]
    Unreachable(String),

    /// The sink refused the request in its current state.
    #[error("Sink rejected request: {0}")]
    Rejected(String),
}

/// Convenient Result alias for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors raised while querying occupancy.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// The destination was deleted or closed.
    #[error("Destination gone: {0}")]
    DestinationGone(String),

    /// The query failed but the destination may still exist.
    #[error("Presence query failed: {0}")]
    Unavailable(String),
}

/// Convenient Result alias for presence queries.
pub type PresenceResult<T> = Result<T, PresenceError>;
