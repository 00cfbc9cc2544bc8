//! Trait abstractions for destination operations.
//!
//! These traits enable dependency injection for testability and modularity.
//! Services depend on traits rather than concrete implementations.

use async_trait::async_trait;

use super::{Occupant, PresenceResult, SinkBinding, SinkResult, SinkState};
use crate::media::{MediaStream, Track};

/// Trait for rendering audio at one destination.
///
/// Used by `QueueController` to start, hold and stop playback.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Starts rendering a stream, replacing whatever was playing.
    ///
    /// The replaced stream must not emit further events.
    ///
    /// # Arguments
    /// * `playback_id` - Identifier echoed back in every `SinkEvent` for this stream
    /// * `track` - The track being played (for logging/metadata)
    /// * `stream` - Encoded audio bytes
    async fn play(&self, playback_id: u64, track: &Track, stream: MediaStream) -> SinkResult<()>;

    /// Holds the current stream without discarding it.
    async fn pause(&self) -> SinkResult<()>;

    /// Resumes a held stream.
    async fn unpause(&self) -> SinkResult<()>;

    /// Stops and discards the current stream.
    async fn stop(&self) -> SinkResult<()>;

    /// Returns the sink's current state.
    fn state(&self) -> SinkState;
}

/// Trait for joining destinations.
///
/// Used by `SessionRegistry` when a destination is first bound.
#[async_trait]
pub trait DestinationConnector: Send + Sync {
    /// Joins a destination and returns its sink and event channel.
    ///
    /// # Arguments
    /// * `destination` - Identifier of the destination to join
    async fn connect(&self, destination: &str) -> SinkResult<SinkBinding>;

    /// Releases a destination after its session ends.
    async fn disconnect(&self, destination: &str);
}

/// Trait for reading who is present at a destination.
///
/// Used by `PresenceMonitor` on every tick.
#[async_trait]
pub trait PresenceSource: Send + Sync {
    /// Lists the occupants of a destination.
    ///
    /// # Arguments
    /// * `destination` - Identifier of the destination to inspect
    async fn occupants(&self, destination: &str) -> PresenceResult<Vec<Occupant>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Traits (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// Combined trait for everything a session needs from a destination provider.
#[async_trait]
pub trait DestinationGateway: DestinationConnector + PresenceSource {}

/// Blanket implementation for any type implementing both traits.
impl<T: DestinationConnector + PresenceSource> DestinationGateway for T {}
