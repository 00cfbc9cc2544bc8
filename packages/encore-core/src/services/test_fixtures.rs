//! Shared test doubles for the media, sink and presence traits.
//!
//! Used by the controller, monitor, registry and router test modules.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::media::{MediaError, MediaResult, MediaSource, MediaStream, Track};
use crate::sink::{
    DestinationConnector, Occupant, PlaybackSink, PresenceError, PresenceResult, PresenceSource,
    SinkBinding, SinkError, SinkEvent, SinkResult, SinkState,
};

/// Reference the mock media source assigns to a query.
pub fn reference_for(query: &str) -> String {
    format!("ref:{query}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Media
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory media source.
///
/// Every query resolves to `Track(ref:{query}, {query})` unless marked
/// unresolvable. Streams are a single chunk unless the reference is broken.
#[derive(Default)]
pub struct MockMediaSource {
    unresolvable: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
    playlists: Mutex<HashMap<String, Vec<Track>>>,
    /// When set, `resolve` waits for a notification before answering.
    gate: Mutex<Option<Arc<Notify>>>,
    /// When true, `resolve` never completes.
    hang: AtomicBool,
    pub resolve_calls: AtomicUsize,
    opened: Mutex<Vec<String>>,
}

impl MockMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_resolve(&self, query: &str) {
        self.unresolvable.lock().insert(query.to_string());
    }

    pub fn break_stream(&self, query: &str) {
        self.broken.lock().insert(reference_for(query));
    }

    pub fn add_playlist(&self, reference: &str, queries: &[&str]) {
        let tracks = queries
            .iter()
            .map(|q| Track::new(reference_for(q), *q))
            .collect();
        self.playlists.lock().insert(reference.to_string(), tracks);
    }

    /// Makes `resolve` wait on the returned notifier.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&notify));
        notify
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Titles of every stream opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn resolve(&self, query: &str) -> MediaResult<Track> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.unresolvable.lock().contains(query) {
            return Err(MediaError::NotFound(query.to_string()));
        }
        Ok(Track::new(reference_for(query), query))
    }

    async fn resolve_playlist(&self, reference: &str) -> MediaResult<Vec<Track>> {
        self.playlists
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| MediaError::EmptyPlaylist(reference.to_string()))
    }

    async fn open_stream(&self, track: &Track) -> MediaResult<MediaStream> {
        self.opened.lock().push(track.title().to_string());
        if self.broken.lock().contains(track.reference()) {
            return Err(MediaError::Extractor(format!(
                "no audio for {}",
                track.reference()
            )));
        }
        let chunks = vec![Ok(Bytes::from_static(b"audio"))];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sink
// ─────────────────────────────────────────────────────────────────────────────

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Play { playback_id: u64, title: String },
    Pause,
    Unpause,
    Stop,
}

/// Sink that records every call.
#[derive(Default)]
pub struct MockSink {
    calls: Mutex<Vec<SinkCall>>,
    state: Mutex<SinkState>,
    rejected: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `play` reject the given title.
    pub fn reject(&self, title: &str) {
        self.rejected.lock().insert(title.to_string());
    }

    /// Makes every call fail as unreachable.
    pub fn vanish(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    /// Titles handed to `play`, in order.
    pub fn played(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                SinkCall::Play { title, .. } => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &SinkCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn last_playback_id(&self) -> Option<u64> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            SinkCall::Play { playback_id, .. } => Some(*playback_id),
            _ => None,
        })
    }

    fn check_reachable(&self) -> SinkResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(SinkError::Unreachable("mock destination vanished".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PlaybackSink for MockSink {
    async fn play(&self, playback_id: u64, track: &Track, _stream: MediaStream) -> SinkResult<()> {
        self.check_reachable()?;
        if self.rejected.lock().contains(track.title()) {
            return Err(SinkError::Rejected(format!("cannot play {}", track.title())));
        }
        self.calls.lock().push(SinkCall::Play {
            playback_id,
            title: track.title().to_string(),
        });
        *self.state.lock() = SinkState::Playing;
        Ok(())
    }

    async fn pause(&self) -> SinkResult<()> {
        self.check_reachable()?;
        self.calls.lock().push(SinkCall::Pause);
        *self.state.lock() = SinkState::Paused;
        Ok(())
    }

    async fn unpause(&self) -> SinkResult<()> {
        self.check_reachable()?;
        self.calls.lock().push(SinkCall::Unpause);
        *self.state.lock() = SinkState::Playing;
        Ok(())
    }

    async fn stop(&self) -> SinkResult<()> {
        self.check_reachable()?;
        self.calls.lock().push(SinkCall::Stop);
        *self.state.lock() = SinkState::Idle;
        Ok(())
    }

    fn state(&self) -> SinkState {
        *self.state.lock()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Presence
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reading {
    Occupants(Vec<Occupant>),
    Unavailable(String),
    Gone(String),
}

/// Presence source returning whatever was last set.
///
/// Starts with one listener present.
pub struct MockPresence {
    reading: Mutex<Reading>,
    pub queries: AtomicUsize,
}

impl MockPresence {
    pub fn new() -> Self {
        Self {
            reading: Mutex::new(Reading::Occupants(vec![Occupant::listener("listener")])),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, result: PresenceResult<Vec<Occupant>>) {
        *self.reading.lock() = match result {
            Ok(occupants) => Reading::Occupants(occupants),
            Err(PresenceError::Unavailable(r)) => Reading::Unavailable(r),
            Err(PresenceError::DestinationGone(r)) => Reading::Gone(r),
        };
    }

    pub fn set_listeners(&self, count: usize) {
        let mut occupants = vec![Occupant::operator("encore")];
        occupants.extend((0..count).map(|i| Occupant::listener(format!("listener-{i}"))));
        self.set(Ok(occupants));
    }
}

#[async_trait]
impl PresenceSource for MockPresence {
    async fn occupants(&self, _destination: &str) -> PresenceResult<Vec<Occupant>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match self.reading.lock().clone() {
            Reading::Occupants(o) => Ok(o),
            Reading::Unavailable(r) => Err(PresenceError::Unavailable(r)),
            Reading::Gone(r) => Err(PresenceError::DestinationGone(r)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Destination gateway handing out [`MockSink`]s.
pub struct MockGateway {
    sinks: DashMap<String, Arc<MockSink>>,
    senders: DashMap<String, mpsc::UnboundedSender<SinkEvent>>,
    pub presence: MockPresence,
    unreachable: Mutex<HashSet<String>>,
    pub connects: AtomicUsize,
    disconnects: Mutex<Vec<String>>,
    /// How long `disconnect` takes before releasing the destination.
    disconnect_delay: Mutex<Option<Duration>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            sinks: DashMap::new(),
            senders: DashMap::new(),
            presence: MockPresence::new(),
            unreachable: Mutex::new(HashSet::new()),
            connects: AtomicUsize::new(0),
            disconnects: Mutex::new(Vec::new()),
            disconnect_delay: Mutex::new(None),
        }
    }

    pub fn set_disconnect_delay(&self, delay: Duration) {
        *self.disconnect_delay.lock() = Some(delay);
    }

    pub fn refuse(&self, destination: &str) {
        self.unreachable.lock().insert(destination.to_string());
    }

    pub fn sink(&self, destination: &str) -> Option<Arc<MockSink>> {
        self.sinks.get(destination).map(|s| Arc::clone(s.value()))
    }

    /// Pushes a sink event into a connected destination's channel.
    pub fn send_event(&self, destination: &str, event: SinkEvent) -> bool {
        self.senders
            .get(destination)
            .map(|tx| tx.send(event).is_ok())
            .unwrap_or(false)
    }

    pub fn disconnects(&self) -> Vec<String> {
        self.disconnects.lock().clone()
    }
}

#[async_trait]
impl DestinationConnector for MockGateway {
    async fn connect(&self, destination: &str) -> SinkResult<SinkBinding> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.lock().contains(destination) {
            return Err(SinkError::Unreachable(format!("{destination} refused")));
        }
        let sink = Arc::new(MockSink::new());
        let (tx, rx) = mpsc::unbounded_channel();
        self.sinks.insert(destination.to_string(), Arc::clone(&sink));
        self.senders.insert(destination.to_string(), tx);
        Ok(SinkBinding { sink, events: rx })
    }

    async fn disconnect(&self, destination: &str) {
        let delay = *self.disconnect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.senders.remove(destination);
        self.disconnects.lock().push(destination.to_string());
    }
}

#[async_trait]
impl PresenceSource for MockGateway {
    async fn occupants(&self, destination: &str) -> PresenceResult<Vec<Occupant>> {
        self.presence.occupants(destination).await
    }
}
