//! Ordered playlist with a playback cursor.
//!
//! Insertion order is playback order, and no two entries share a reference:
//! re-adding a reference moves it to the end. The cursor is `None` exactly
//! when the playlist is empty.

use serde::Serialize;

use crate::media::Track;

/// Result of appending a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Index the reference previously occupied, if it was already queued.
    pub moved_from: Option<usize>,
    /// Index the track now occupies.
    pub index: usize,
}

/// One row of a playlist listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// 1-indexed display position.
    pub position: usize,
    /// Track title.
    pub title: String,
}

/// Ordered, deduplicated tracks plus the current-position cursor.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
    cursor: Option<usize>,
}

impl Playlist {
    /// Creates an empty playlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the playlist has no tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Current cursor position, `None` when empty.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The track under the cursor.
    pub fn current(&self) -> Option<&Track> {
        self.cursor.and_then(|i| self.tracks.get(i))
    }

    /// Index of the entry with the given reference.
    pub fn position_of(&self, reference: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.reference() == reference)
    }

    /// Appends a track, moving an existing entry with the same reference to the end.
    ///
    /// The cursor keeps pointing at the same track: removing an entry before it
    /// shifts it down by one, and if the cursor's own track is re-added the
    /// cursor follows it to the end. An append to an empty playlist parks the
    /// cursor on the new track.
    pub fn append(&mut self, track: Track) -> AppendOutcome {
        let was_empty = self.tracks.is_empty();
        let moved_from = self.position_of(track.reference());
        let mut follow = false;

        if let Some(old) = moved_from {
            self.tracks.remove(old);
            match self.cursor {
                Some(c) if old < c => self.cursor = Some(c - 1),
                Some(c) if old == c => follow = true,
                _ => {}
            }
        }

        self.tracks.push(track);
        let index = self.tracks.len() - 1;

        if was_empty || follow {
            self.cursor = Some(index);
        }

        AppendOutcome {
            moved_from,
            index,
        }
    }

    /// Moves the cursor to `index`. Returns false if out of range.
    pub fn seek(&mut self, index: usize) -> bool {
        if index < self.tracks.len() {
            self.cursor = Some(index);
            true
        } else {
            false
        }
    }

    /// Advances the cursor by one, wrapping to the start.
    pub fn advance_wrapping(&mut self) -> Option<usize> {
        let len = self.tracks.len();
        let next = (self.cursor? + 1) % len;
        self.cursor = Some(next);
        Some(next)
    }

    /// Moves the cursor back by one, wrapping to the end.
    pub fn retreat_wrapping(&mut self) -> Option<usize> {
        let len = self.tracks.len();
        let prev = (self.cursor? + len - 1) % len;
        self.cursor = Some(prev);
        Some(prev)
    }

    /// Advances the cursor by one without wrapping.
    ///
    /// Returns `None` (leaving the cursor on the last entry) when already at the end.
    pub fn advance_to_next(&mut self) -> Option<usize> {
        let next = self.cursor? + 1;
        if next < self.tracks.len() {
            self.cursor = Some(next);
            Some(next)
        } else {
            None
        }
    }

    /// Returns a 1-indexed listing for display.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.tracks
            .iter()
            .enumerate()
            .map(|(i, t)| QueueEntry {
                position: i + 1,
                title: t.title().to_string(),
            })
            .collect()
    }
}
