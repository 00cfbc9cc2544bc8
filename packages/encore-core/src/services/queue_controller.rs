//! Per-destination playback queue.
//!
//! Responsibilities:
//! - Owning the playlist and its cursor
//! - Driving `MediaSource` -> `PlaybackSink` transitions
//! - Auto-advancing on sink idle/error events
//! - Pausing and resuming on presence changes
//!
//! Every operation takes the controller's async mutex for its whole duration,
//! including the time spent waiting on the media source. `tokio::sync::Mutex`
//! queues waiters in FIFO order, so commands that arrive while a resolution is
//! in flight are applied afterwards in arrival order.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{QueueError, QueueResult};
use crate::events::{EventEmitter, QueueEvent};
use crate::media::{MediaSource, Track};
use crate::playlist::{Playlist, QueueEntry};
use crate::services::Presence;
use crate::sink::{PlaybackSink, SinkError, SinkEvent};
use crate::utils::now_millis;

/// Playback state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing is playing.
    #[default]
    Idle,
    /// A track is streaming to the sink.
    Playing,
    /// A track is loaded but held because nobody is listening.
    Paused,
}

/// Read-only view of a controller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub destination: String,
    pub state: SessionState,
    /// 0-indexed cursor, absent when the queue is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Track>,
    pub tracks: Vec<QueueEntry>,
    pub presence: Presence,
}

/// Mutable state guarded by the controller mutex.
#[derive(Debug, Default)]
struct QueueState {
    playlist: Playlist,
    session: SessionState,
    /// Last definite presence reading. `Unknown` until the first one arrives.
    presence: Presence,
    /// ID of the stream most recently handed to the sink.
    playback_id: u64,
}

/// Owns one destination's playlist and drives its sink.
pub struct QueueController {
    destination: String,
    media: Arc<dyn MediaSource>,
    sink: Arc<dyn PlaybackSink>,
    emitter: Arc<dyn EventEmitter>,
    state: Mutex<QueueState>,
    cancel_token: CancellationToken,
}

impl QueueController {
    /// Creates a controller for `destination`.
    ///
    /// Cancelling `cancel_token` aborts in-flight work; use [`stop`](Self::stop)
    /// to also silence the sink.
    pub fn new(
        destination: impl Into<String>,
        media: Arc<dyn MediaSource>,
        sink: Arc<dyn PlaybackSink>,
        emitter: Arc<dyn EventEmitter>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            destination: destination.into(),
            media,
            sink,
            emitter,
            state: Mutex::new(QueueState::default()),
            cancel_token,
        }
    }

    /// Destination this controller plays to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Whether the controller has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolves `query` and appends the track.
    ///
    /// A reference that is already queued moves to the end. If nothing was
    /// playing (empty queue, or the queue ran off its end), the new track
    /// starts immediately. A failed start is reported through events and
    /// logs; the add itself still succeeds.
    pub async fn add(&self, query: &str) -> QueueResult<Track> {
        let mut state = self.lock().await?;

        let track = self
            .cancellable(self.media.resolve(query))
            .await?
            .map_err(|e| QueueError::resolution(query, &e))?;

        let outcome = state.playlist.append(track.clone());
        log::info!(
            "[Queue] {}: added '{}' at position {}{}",
            self.destination,
            track.title(),
            outcome.index + 1,
            if outcome.moved_from.is_some() {
                " (moved)"
            } else {
                ""
            }
        );
        self.emitter.emit_queue(QueueEvent::TrackAdded {
            destination: self.destination.clone(),
            title: track.title().to_string(),
            position: outcome.index + 1,
            timestamp: now_millis(),
        });

        if state.session == SessionState::Idle {
            state.playlist.seek(outcome.index);
            self.start_reporting(&mut state).await?;
        }

        Ok(track)
    }

    /// Resolves a playlist reference and appends every entry in order.
    ///
    /// If nothing was playing, playback starts from the first loaded entry.
    pub async fn add_playlist(&self, reference: &str) -> QueueResult<Vec<Track>> {
        let mut state = self.lock().await?;

        let tracks = self
            .cancellable(self.media.resolve_playlist(reference))
            .await?
            .map_err(|e| QueueError::resolution(reference, &e))?;

        for track in &tracks {
            state.playlist.append(track.clone());
        }

        log::info!(
            "[Queue] {}: loaded {} track(s) from {}",
            self.destination,
            tracks.len(),
            reference
        );
        self.emitter.emit_queue(QueueEvent::PlaylistLoaded {
            destination: self.destination.clone(),
            count: tracks.len(),
            timestamp: now_millis(),
        });

        if state.session == SessionState::Idle {
            let first = tracks
                .first()
                .and_then(|t| state.playlist.position_of(t.reference()));
            if let Some(index) = first {
                state.playlist.seek(index);
                self.start_reporting(&mut state).await?;
            }
        }

        Ok(tracks)
    }

    /// Moves to the next track (wrapping) and plays it.
    pub async fn skip(&self) -> QueueResult<Track> {
        let mut state = self.lock().await?;
        if state.playlist.advance_wrapping().is_none() {
            return Err(QueueError::EmptyQueue);
        }
        self.play_current(&mut state).await
    }

    /// Moves to the previous track (wrapping) and plays it.
    pub async fn previous(&self) -> QueueResult<Track> {
        let mut state = self.lock().await?;
        if state.playlist.retreat_wrapping().is_none() {
            return Err(QueueError::EmptyQueue);
        }
        self.play_current(&mut state).await
    }

    /// Lists the queue, 1-indexed.
    pub async fn list_queue(&self) -> QueueResult<Vec<QueueEntry>> {
        let state = self.lock().await?;
        Ok(state.playlist.entries())
    }

    /// Returns a read-only view of the controller.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        QueueSnapshot {
            destination: self.destination.clone(),
            state: state.session,
            cursor: state.playlist.cursor(),
            current: state.playlist.current().cloned(),
            tracks: state.playlist.entries(),
            presence: state.presence,
        }
    }

    /// Stops playback for good.
    ///
    /// In-flight operations fail with `Cancelled`, the sink is stopped, and
    /// every later operation fails with `Cancelled` too.
    pub async fn stop(&self) {
        self.cancel_token.cancel();

        let mut state = self.state.lock().await;
        // Invalidate events from whatever was last handed to the sink.
        state.playback_id += 1;
        state.session = SessionState::Idle;

        if let Err(e) = self.sink.stop().await {
            log::warn!("[Queue] {}: sink stop failed: {}", self.destination, e);
        }

        log::info!("[Queue] {}: stopped", self.destination);
        self.emitter.emit_queue(QueueEvent::Stopped {
            destination: self.destination.clone(),
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sink and presence events
    // ─────────────────────────────────────────────────────────────────────────

    /// Routes a sink event to the matching handler.
    pub async fn on_sink_event(&self, event: SinkEvent) -> QueueResult<()> {
        match event {
            SinkEvent::Idle { playback_id } => self.on_sink_idle(playback_id).await,
            SinkEvent::Error {
                playback_id,
                message,
            } => self.on_sink_error(playback_id, &message).await,
        }
    }

    /// Handles a track finishing naturally.
    ///
    /// Advances without wrapping; at the last entry the session goes Idle.
    pub async fn on_sink_idle(&self, playback_id: u64) -> QueueResult<()> {
        let mut state = self.lock().await?;
        if !self.is_live(&state, playback_id) {
            return Ok(());
        }
        log::debug!("[Queue] {}: track finished", self.destination);
        self.advance_after_track(&mut state).await
    }

    /// Handles a stream failing mid-playback. Same as idle, logged as an error.
    pub async fn on_sink_error(&self, playback_id: u64, message: &str) -> QueueResult<()> {
        let mut state = self.lock().await?;
        if !self.is_live(&state, playback_id) {
            return Ok(());
        }
        log::error!(
            "[Queue] {}: playback of '{}' failed: {}",
            self.destination,
            state.playlist.current().map(Track::title).unwrap_or("?"),
            message
        );
        self.advance_after_track(&mut state).await
    }

    /// Applies a presence reading.
    ///
    /// Pauses when listeners leave during playback and resumes when they come
    /// back. Repeated readings are no-ops; `Unknown` leaves everything as is.
    pub async fn on_presence(&self, presence: Presence) -> QueueResult<()> {
        if presence == Presence::Unknown {
            return Ok(());
        }
        let mut state = self.lock().await?;
        state.presence = presence;

        match (presence, state.session) {
            (Presence::Absent, SessionState::Playing) => self.pause(&mut state).await,
            (Presence::Present, SessionState::Paused) => self.resume(&mut state).await,
            _ => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn lock(&self) -> QueueResult<MutexGuard<'_, QueueState>> {
        let state = self.cancellable(self.state.lock()).await?;
        if self.cancel_token.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        Ok(state)
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = T>) -> QueueResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(QueueError::Cancelled),
            out = fut => Ok(out),
        }
    }

    fn is_live(&self, state: &QueueState, playback_id: u64) -> bool {
        if playback_id != state.playback_id || state.session == SessionState::Idle {
            log::debug!(
                "[Queue] {}: ignoring stale sink event for playback {} (current {})",
                self.destination,
                playback_id,
                state.playback_id
            );
            return false;
        }
        true
    }

    async fn advance_after_track(&self, state: &mut QueueState) -> QueueResult<()> {
        if state.playlist.advance_to_next().is_none() {
            state.session = SessionState::Idle;
            log::info!("[Queue] {}: reached end of queue", self.destination);
            self.emitter.emit_queue(QueueEvent::Finished {
                destination: self.destination.clone(),
                timestamp: now_millis(),
            });
            return Ok(());
        }
        self.play_current(state).await.map(|_| ())
    }

    /// Starts playback after an add, swallowing non-fatal failures.
    async fn start_reporting(&self, state: &mut QueueState) -> QueueResult<()> {
        match self.play_current(state).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() || matches!(e, QueueError::Cancelled) => Err(e),
            Err(e) => {
                log::warn!("[Queue] {}: could not start playback: {}", self.destination, e);
                Ok(())
            }
        }
    }

    /// Plays the track under the cursor, skipping forward past failures.
    ///
    /// Gives up after one full lap of the playlist.
    async fn play_current(&self, state: &mut QueueState) -> QueueResult<Track> {
        let attempts = state.playlist.len();
        if attempts == 0 {
            return Err(QueueError::EmptyQueue);
        }

        for _ in 0..attempts {
            let track = state
                .playlist
                .current()
                .cloned()
                .ok_or(QueueError::EmptyQueue)?;

            match self.start(state, &track).await {
                Ok(()) => return Ok(track),
                Err(e) if e.is_fatal() || matches!(e, QueueError::Cancelled) => return Err(e),
                Err(e) => {
                    log::warn!("[Queue] {}: {}; advancing", self.destination, e);
                    self.emitter.emit_queue(QueueEvent::TrackFailed {
                        destination: self.destination.clone(),
                        title: track.title().to_string(),
                        reason: e.to_string(),
                        timestamp: now_millis(),
                    });
                    state.playlist.advance_wrapping();
                }
            }
        }

        // Nothing played: silence whatever the sink still holds.
        state.playback_id += 1;
        state.session = SessionState::Idle;
        match self.sink.stop().await {
            Err(SinkError::Unreachable(reason)) => {
                return Err(QueueError::unreachable(&self.destination, reason));
            }
            Err(e) => log::warn!("[Queue] {}: sink stop failed: {}", self.destination, e),
            Ok(()) => {}
        }

        log::error!(
            "[Queue] {}: no playable track after {} attempt(s)",
            self.destination,
            attempts
        );
        self.emitter.emit_queue(QueueEvent::Exhausted {
            destination: self.destination.clone(),
            attempts,
            timestamp: now_millis(),
        });
        Err(QueueError::PlaybackExhausted { attempts })
    }

    /// Opens a stream for `track` and hands it to the sink.
    async fn start(&self, state: &mut QueueState, track: &Track) -> QueueResult<()> {
        let streaming = |reason: String| QueueError::Streaming {
            title: track.title().to_string(),
            reason,
        };

        let stream = self
            .cancellable(self.media.open_stream(track))
            .await?
            .map_err(|e| streaming(e.to_string()))?;

        state.playback_id += 1;
        let playback_id = state.playback_id;

        match self
            .cancellable(self.sink.play(playback_id, track, stream))
            .await?
        {
            Ok(()) => {}
            Err(SinkError::Unreachable(reason)) => {
                return Err(QueueError::unreachable(&self.destination, reason));
            }
            Err(e) => return Err(streaming(e.to_string())),
        }

        state.session = SessionState::Playing;
        let position = state.playlist.cursor().map_or(0, |c| c + 1);
        log::info!(
            "[Queue] {}: now playing '{}' ({}/{})",
            self.destination,
            track.title(),
            position,
            state.playlist.len()
        );
        self.emitter.emit_queue(QueueEvent::NowPlaying {
            destination: self.destination.clone(),
            title: track.title().to_string(),
            position,
            playback_id,
            timestamp: now_millis(),
        });

        if state.presence == Presence::Absent {
            self.pause(state).await?;
        }
        Ok(())
    }

    async fn pause(&self, state: &mut QueueState) -> QueueResult<()> {
        match self.sink.pause().await {
            Ok(()) => {
                state.session = SessionState::Paused;
                log::info!("[Queue] {}: no listeners, paused", self.destination);
                self.emitter.emit_queue(QueueEvent::Paused {
                    destination: self.destination.clone(),
                    timestamp: now_millis(),
                });
                Ok(())
            }
            Err(SinkError::Unreachable(reason)) => {
                Err(QueueError::unreachable(&self.destination, reason))
            }
            Err(e) => {
                log::warn!("[Queue] {}: pause rejected: {}", self.destination, e);
                Ok(())
            }
        }
    }

    async fn resume(&self, state: &mut QueueState) -> QueueResult<()> {
        match self.sink.unpause().await {
            Ok(()) => {
                state.session = SessionState::Playing;
                log::info!("[Queue] {}: listener returned, resumed", self.destination);
                self.emitter.emit_queue(QueueEvent::Resumed {
                    destination: self.destination.clone(),
                    timestamp: now_millis(),
                });
                Ok(())
            }
            Err(SinkError::Unreachable(reason)) => {
                Err(QueueError::unreachable(&self.destination, reason))
            }
            Err(e) => {
                log::warn!("[Queue] {}: unpause rejected: {}", self.destination, e);
                Ok(())
            }
        }
    }
}
