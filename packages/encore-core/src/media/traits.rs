//! Trait abstraction for media extraction.
//!
//! Services depend on [`MediaSource`] rather than on the yt-dlp process so the
//! queue logic can be exercised with in-memory sources.

use async_trait::async_trait;

use super::{MediaResult, MediaStream, Track};

/// Resolves media references and opens audio streams.
///
/// Used by `QueueController` for `add`, playlist loading and `play_current`.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Resolves a URL or search query to a single track.
    ///
    /// # Arguments
    /// * `query` - A media URL or free-text search term
    async fn resolve(&self, query: &str) -> MediaResult<Track>;

    /// Resolves a playlist reference to its tracks, in playlist order.
    ///
    /// # Arguments
    /// * `reference` - The playlist URL
    async fn resolve_playlist(&self, reference: &str) -> MediaResult<Vec<Track>>;

    /// Opens an encoded audio stream for a previously resolved track.
    ///
    /// Implementations should fail here (rather than yield an empty stream)
    /// when the media cannot be produced, so callers can move on to the next
    /// track.
    async fn open_stream(&self, track: &Track) -> MediaResult<MediaStream>;
}
