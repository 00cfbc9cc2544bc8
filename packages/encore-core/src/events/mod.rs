//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for queue activity and session lifecycle

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::services::Presence;

/// Events broadcast to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Playlist and playback changes inside one session.
    Queue(QueueEvent),

    /// Session lifecycle and presence changes.
    Session(SessionEvent),
}

/// Events emitted by a queue controller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    /// A track was appended (or moved to the end).
    TrackAdded {
        destination: String,
        title: String,
        /// 1-indexed position after the append.
        position: usize,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A playlist was expanded into the queue.
    PlaylistLoaded {
        destination: String,
        count: usize,
        timestamp: u64,
    },
    /// A track started playing.
    NowPlaying {
        destination: String,
        title: String,
        /// 1-indexed position of the track.
        position: usize,
        #[serde(rename = "playbackId")]
        playback_id: u64,
        timestamp: u64,
    },
    /// A track could not be streamed and was skipped.
    TrackFailed {
        destination: String,
        title: String,
        reason: String,
        timestamp: u64,
    },
    /// A full lap of the playlist failed to play.
    Exhausted {
        destination: String,
        attempts: usize,
        timestamp: u64,
    },
    /// The last track finished and playback stopped.
    Finished {
        destination: String,
        timestamp: u64,
    },
    /// Playback was held because nobody is listening.
    Paused {
        destination: String,
        timestamp: u64,
    },
    /// Playback resumed after a listener returned.
    Resumed {
        destination: String,
        timestamp: u64,
    },
    /// Playback was stopped and the controller shut down.
    Stopped {
        destination: String,
        timestamp: u64,
    },
}

/// Events related to session lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A destination was joined and a session started.
    Bound {
        destination: String,
        timestamp: u64,
    },
    /// A presence reading differed from the previous one.
    PresenceChanged {
        destination: String,
        presence: Presence,
        timestamp: u64,
    },
    /// A session ended.
    TornDown {
        destination: String,
        /// Why the session ended, if it was not an explicit request.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        timestamp: u64,
    },
}
