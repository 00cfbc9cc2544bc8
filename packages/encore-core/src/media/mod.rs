//! Media resolution and streaming.
//!
//! A [`MediaSource`] turns a user query into a [`Track`] and a track into a
//! byte stream of encoded audio. The production implementation shells out to
//! yt-dlp ([`YtDlpSource`]); tests provide in-memory fakes.

mod traits;
pub mod ytdlp;

pub use traits::MediaSource;
pub use ytdlp::YtDlpSource;

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

/// Boxed byte stream of encoded audio.
pub type MediaStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// One playable item: a resolved reference plus a display title.
///
/// Immutable once created. Two tracks are the same playlist entry when their
/// references are equal; titles are display-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    reference: String,
    title: String,
}

impl Track {
    /// Creates a track. An empty title falls back to the reference.
    pub fn new(reference: impl Into<String>, title: impl Into<String>) -> Self {
        let reference = reference.into();
        let title = title.into();
        let title = if title.trim().is_empty() {
            reference.clone()
        } else {
            title
        };
        Self { reference, title }
    }

    /// The opaque reference (URL or ID) used for streaming and dedupe.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The display title.
    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Errors that can occur while resolving or streaming media.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Nothing matched the query or reference.
    #[error("No media found for '{0}'")]
    NotFound(String),

    /// The playlist resolved but contained no playable entries.
    #[error("Playlist '{0}' is empty")]
    EmptyPlaylist(String),

    /// The extractor process could not be launched or its pipe failed.
    #[error("Extractor I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The extractor ran but reported a failure.
    #[error("Extractor failed: {0}")]
    Extractor(String),

    /// The extractor did not answer in time.
    #[error("Extractor timed out after {0}s")]
    Timeout(u64),
}

/// Convenient Result alias for media operations.
pub type MediaResult<T> = Result<T, MediaError>;
