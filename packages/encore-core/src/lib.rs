//! Encore Core - shared library for the Encore playback server.
//!
//! Encore keeps one playback queue per destination, resolves user queries to
//! tracks, streams them to the destination's sink and pauses while nobody is
//! listening.
//!
//! # Architecture
//!
//! - [`playlist`]: Ordered, deduplicated track list with a cursor
//! - [`services`]: Queue controller, presence monitor, sessions, command routing
//! - [`media`]: Query resolution and audio streams (yt-dlp)
//! - [`sink`]: Playback sink and presence abstractions
//! - [`relay`]: HTTP relay implementation of the sink abstractions
//! - [`events`]: Event system for real-time client communication
//! - [`api`]: HTTP and WebSocket surface
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`MediaSource`](media::MediaSource): Resolving queries and opening streams
//! - [`PlaybackSink`](sink::PlaybackSink): Playing, pausing and stopping audio
//! - [`PresenceSource`](sink::PresenceSource): Reading a destination's occupants
//! - [`DestinationConnector`](sink::DestinationConnector): Joining destinations
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod media;
pub mod playlist;
pub mod relay;
pub mod runtime;
pub mod services;
pub mod sink;
pub mod utils;

// Re-export commonly used types at the crate root
pub use config::{Config, MediaConfig, RelayConfig};
pub use error::{EncoreError, EncoreResult, ErrorCode, QueueError, QueueResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, LoggingEventEmitter, NoopEventEmitter,
    QueueEvent, SessionEvent,
};
pub use media::{MediaError, MediaSource, Track, YtDlpSource};
pub use playlist::{Playlist, QueueEntry};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use utils::{now_millis, validate_destination_id};

// Re-export service types
pub use services::{
    CommandContext, CommandReply, CommandRouter, PlaybackSession, Presence, QueueController,
    QueueSnapshot, SessionRegistry, SessionState,
};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{bind_listener, serve, start_server, AppState, ServerError, WsConnectionManager};
