//! Process-wide registry of playback sessions.
//!
//! Maps destination identifiers to their [`PlaybackSession`]. The registry
//! only provides lookup and lifecycle; each session's queue state stays inside
//! its own controller.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::session::PlaybackSession;
use super::{PresenceMonitor, QueueController, QueueSnapshot};
use crate::config::Config;
use crate::error::{QueueError, QueueResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::media::MediaSource;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::sink::{DestinationConnector, DestinationGateway, PresenceSource};
use crate::utils::now_millis;

/// Per-session settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub presence_interval: Duration,
    pub operator_ids: Arc<HashSet<String>>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            presence_interval: Duration::from_secs(config.presence_interval_secs),
            operator_ids: Arc::new(config.operator_ids.iter().cloned().collect()),
        }
    }
}

/// Owns every live session, keyed by destination.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<PlaybackSession>>,
    /// Serializes binds and teardowns so a destination is never joined
    /// while its previous session is still leaving.
    bind_lock: Mutex<()>,
    connector: Arc<dyn DestinationConnector>,
    presence: Arc<dyn PresenceSource>,
    media: Arc<dyn MediaSource>,
    emitter: Arc<dyn EventEmitter>,
    settings: SessionSettings,
    spawner: TokioSpawner,
    cancel_token: CancellationToken,
}

impl SessionRegistry {
    pub fn new<G: DestinationGateway + 'static>(
        gateway: Arc<G>,
        media: Arc<dyn MediaSource>,
        emitter: Arc<dyn EventEmitter>,
        settings: SessionSettings,
        spawner: TokioSpawner,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            bind_lock: Mutex::new(()),
            connector: Arc::clone(&gateway) as Arc<dyn DestinationConnector>,
            presence: gateway as Arc<dyn PresenceSource>,
            media,
            emitter,
            settings,
            spawner,
            cancel_token,
        }
    }

    /// Joins `destination` and starts its session.
    ///
    /// Fails with `SessionConflict` if the destination already has one.
    pub async fn bind(self: &Arc<Self>, destination: &str) -> QueueResult<Arc<PlaybackSession>> {
        let _guard = self.bind_lock.lock().await;
        if self.sessions.contains_key(destination) {
            return Err(QueueError::SessionConflict(destination.to_string()));
        }
        self.bind_locked(destination).await
    }

    /// Returns the existing session for `destination`, binding one if needed.
    pub async fn get_or_bind(
        self: &Arc<Self>,
        destination: &str,
    ) -> QueueResult<Arc<PlaybackSession>> {
        if let Some(session) = self.get(destination) {
            return Ok(session);
        }
        let _guard = self.bind_lock.lock().await;
        if let Some(session) = self.get(destination) {
            return Ok(session);
        }
        self.bind_locked(destination).await
    }

    pub fn get(&self, destination: &str) -> Option<Arc<PlaybackSession>> {
        self.sessions.get(destination).map(|s| Arc::clone(s.value()))
    }

    /// Destinations with a live session, sorted.
    pub fn destinations(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshots every session's queue, sorted by destination.
    pub async fn snapshots(&self) -> Vec<QueueSnapshot> {
        let sessions: Vec<Arc<PlaybackSession>> =
            self.sessions.iter().map(|e| Arc::clone(e.value())).collect();

        let mut snapshots = Vec::with_capacity(sessions.len());
        for session in sessions {
            snapshots.push(session.controller().snapshot().await);
        }
        snapshots.sort_by(|a, b| a.destination.cmp(&b.destination));
        snapshots
    }

    /// Stops a session and releases its destination.
    ///
    /// Returns false if nothing was bound. The destination stays locked
    /// against new binds until the sink is stopped and disconnected.
    pub async fn teardown(&self, destination: &str) -> bool {
        let _guard = self.bind_lock.lock().await;
        match self.sessions.remove(destination) {
            Some((_, session)) => {
                self.finish(&session, None).await;
                true
            }
            None => false,
        }
    }

    /// Tears down every session and refuses further binds.
    pub async fn shutdown(&self) -> usize {
        let destinations = self.destinations();
        let mut count = 0;
        for destination in &destinations {
            if self.teardown(destination).await {
                count += 1;
            }
        }
        self.cancel_token.cancel();
        log::info!("[Registry] Shut down {} session(s)", count);
        count
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn bind_locked(
        self: &Arc<Self>,
        destination: &str,
    ) -> QueueResult<Arc<PlaybackSession>> {
        if self.cancel_token.is_cancelled() {
            return Err(QueueError::Cancelled);
        }

        let binding = self
            .connector
            .connect(destination)
            .await
            .map_err(|e| QueueError::unreachable(destination, e))?;

        let session_token = self.cancel_token.child_token();
        let controller = Arc::new(QueueController::new(
            destination,
            Arc::clone(&self.media),
            binding.sink,
            Arc::clone(&self.emitter),
            session_token.child_token(),
        ));
        let monitor = PresenceMonitor::new(
            destination,
            Arc::clone(&self.presence),
            Arc::clone(&self.settings.operator_ids),
            self.settings.presence_interval,
        );
        let session = Arc::new(PlaybackSession::new(
            controller,
            monitor,
            Arc::clone(&self.emitter),
            session_token,
        ));

        self.sessions
            .insert(destination.to_string(), Arc::clone(&session));

        let registry: Weak<Self> = Arc::downgrade(self);
        let task_session = Arc::clone(&session);
        let events = binding.events;
        self.spawner.spawn(async move {
            let Some(err) = task_session.run(events).await else {
                return;
            };
            log::warn!(
                "[Registry] Session {} lost its destination: {}",
                task_session.destination(),
                err
            );
            if let Some(registry) = registry.upgrade() {
                registry.remove_session(&task_session, err.to_string()).await;
            }
        });

        log::info!("[Registry] Bound session for {}", destination);
        self.emitter.emit_session(SessionEvent::Bound {
            destination: destination.to_string(),
            timestamp: now_millis(),
        });

        Ok(session)
    }

    /// Removes `session` only if it is still the one registered.
    async fn remove_session(&self, session: &Arc<PlaybackSession>, reason: String) {
        let _guard = self.bind_lock.lock().await;
        let removed = self
            .sessions
            .remove_if(session.destination(), |_, s| Arc::ptr_eq(s, session));
        if removed.is_some() {
            self.finish(session, Some(reason)).await;
        }
    }

    async fn finish(&self, session: &PlaybackSession, reason: Option<String>) {
        session.cancel();
        session.controller().stop().await;
        self.connector.disconnect(session.destination()).await;

        log::info!("[Registry] Tore down session for {}", session.destination());
        self.emitter.emit_session(SessionEvent::TornDown {
            destination: session.destination().to_string(),
            reason,
            timestamp: now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::services::test_fixtures::{MockGateway, MockMediaSource, SinkCall};
    use crate::services::SessionState;
    use crate::sink::{PresenceError, SinkEvent};

    fn registry(gateway: &Arc<MockGateway>) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::clone(gateway),
            Arc::new(MockMediaSource::new()),
            Arc::new(NoopEventEmitter),
            SessionSettings {
                presence_interval: Duration::from_secs(5),
                operator_ids: Arc::new(HashSet::new()),
            },
            TokioSpawner::current(),
            CancellationToken::new(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn second_bind_conflicts() {
        let gateway = Arc::new(MockGateway::new());
        let registry = registry(&gateway);

        registry.bind("lounge").await.unwrap();

        assert!(matches!(
            registry.bind("lounge").await,
            Err(QueueError::SessionConflict(_))
        ));
        assert_eq!(gateway.connects.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn get_or_bind_reuses_session() {
        let gateway = Arc::new(MockGateway::new());
        let registry = registry(&gateway);

        let first = registry.get_or_bind("lounge").await.unwrap();
        let second = registry.get_or_bind("lounge").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_independent_per_destination() {
        let gateway = Arc::new(MockGateway::new());
        let registry = registry(&gateway);

        let lounge = registry.bind("lounge").await.unwrap();
        let studio = registry.bind("studio").await.unwrap();
        lounge.controller().add("A").await.unwrap();

        assert_eq!(lounge.controller().list_queue().await.unwrap().len(), 1);
        assert!(studio.controller().list_queue().await.unwrap().is_empty());
        assert_eq!(registry.destinations(), vec!["lounge", "studio"]);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_destination_is_unreachable() {
        let gateway = Arc::new(MockGateway::new());
        gateway.refuse("void");
        let registry = registry(&gateway);

        let result = registry.bind("void").await;

        assert!(matches!(result, Err(ref e) if e.is_fatal()));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sink_events_reach_the_controller() {
        let gateway = Arc::new(MockGateway::new());
        let registry = registry(&gateway);
        let session = registry.bind("lounge").await.unwrap();
        session.controller().add("A").await.unwrap();
        session.controller().add("B").await.unwrap();

        let sink = gateway.sink("lounge").unwrap();
        let id = sink.last_playback_id().unwrap();
        assert!(gateway.send_event("lounge", SinkEvent::Idle { playback_id: id }));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sink.played(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn presence_ticks_pause_and_resume() {
        let gateway = Arc::new(MockGateway::new());
        let registry = registry(&gateway);
        let session = registry.bind("lounge").await.unwrap();
        session.controller().add("A").await.unwrap();
        let sink = gateway.sink("lounge").unwrap();

        gateway.presence.set_listeners(0);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sink.count(&SinkCall::Pause), 1);
        assert_eq!(
            session.controller().snapshot().await.state,
            SessionState::Paused
        );

        gateway.presence.set_listeners(2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.count(&SinkCall::Unpause), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_destination_tears_session_down() {
        let gateway = Arc::new(MockGateway::new());
        let registry = registry(&gateway);
        let session = registry.bind("lounge").await.unwrap();
        session.controller().add("A").await.unwrap();

        gateway
            .presence
            .set(Err(PresenceError::DestinationGone("deleted".into())));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(registry.get("lounge").is_none());
        assert_eq!(gateway.disconnects(), vec!["lounge"]);
        assert!(session.controller().is_stopped());
        let sink = gateway.sink("lounge").unwrap();
        assert_eq!(sink.count(&SinkCall::Stop), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_stops_and_disconnects() {
        let gateway = Arc::new(MockGateway::new());
        let registry = registry(&gateway);
        let session = registry.bind("lounge").await.unwrap();

        assert!(registry.teardown("lounge").await);
        assert!(!registry.teardown("lounge").await);

        assert!(session.controller().is_stopped());
        assert_eq!(gateway.disconnects(), vec!["lounge"]);

        // Destination can be bound again afterwards
        registry.bind("lounge").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rebind_waits_for_slow_disconnect() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_disconnect_delay(Duration::from_millis(50));
        let registry = registry(&gateway);
        let old = registry.bind("lounge").await.unwrap();

        let teardown = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.teardown("lounge").await }
        });
        while registry.get("lounge").is_some() {
            tokio::task::yield_now().await;
        }
        assert!(gateway.disconnects().is_empty());

        let fresh = registry.bind("lounge").await.unwrap();
        assert!(teardown.await.unwrap());

        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(gateway.disconnects(), vec!["lounge"]);
        assert_eq!(gateway.connects.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&registry.get("lounge").unwrap(), &fresh));

        // The old disconnect must not have released the fresh binding.
        fresh.controller().add("A").await.unwrap();
        let sink = gateway.sink("lounge").unwrap();
        assert_eq!(sink.played(), vec!["A"]);
        let id = sink.last_playback_id().unwrap();
        assert!(gateway.send_event("lounge", SinkEvent::Idle { playback_id: id }));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_tears_down_everything() {
        let gateway = Arc::new(MockGateway::new());
        let registry = registry(&gateway);
        registry.bind("lounge").await.unwrap();
        registry.bind("studio").await.unwrap();

        assert_eq!(registry.shutdown().await, 2);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.bind("lounge").await,
            Err(QueueError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_cover_all_sessions() {
        let gateway = Arc::new(MockGateway::new());
        let registry = registry(&gateway);
        registry.bind("studio").await.unwrap();
        registry.bind("lounge").await.unwrap();

        let snaps = registry.snapshots().await;
        let names: Vec<&str> = snaps.iter().map(|s| s.destination.as_str()).collect();
        assert_eq!(names, vec!["lounge", "studio"]);
    }
}
