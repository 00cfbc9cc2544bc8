//! Live binding of one controller to one destination.
//!
//! Each session runs a single task that feeds sink events and presence ticks
//! into its [`QueueController`], so those triggers are serialized with
//! inbound commands through the controller's mutex.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{Presence, PresenceMonitor, QueueController};
use crate::error::{QueueError, QueueResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::sink::SinkEvent;
use crate::utils::now_millis;

/// One destination's controller plus its event loop.
pub struct PlaybackSession {
    destination: String,
    controller: Arc<QueueController>,
    monitor: PresenceMonitor,
    emitter: Arc<dyn EventEmitter>,
    cancel_token: CancellationToken,
}

impl PlaybackSession {
    pub(crate) fn new(
        controller: Arc<QueueController>,
        monitor: PresenceMonitor,
        emitter: Arc<dyn EventEmitter>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            destination: controller.destination().to_string(),
            controller,
            monitor,
            emitter,
            cancel_token,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The session's queue controller.
    pub fn controller(&self) -> &Arc<QueueController> {
        &self.controller
    }

    /// Stops the event loop. Does not touch the sink.
    pub(crate) fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Runs the event loop until cancelled or the destination is lost.
    ///
    /// Returns the fatal error that ended the session, or `None` when it was
    /// cancelled.
    pub(crate) async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<SinkEvent>,
    ) -> Option<QueueError> {
        let mut interval = tokio::time::interval(self.monitor.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_presence = Presence::Unknown;

        log::debug!("[Session] {}: event loop started", self.destination);

        loop {
            let result = tokio::select! {
                _ = self.cancel_token.cancelled() => return None,
                event = events.recv() => match event {
                    Some(event) => {
                        log::debug!(
                            "[Session] {}: sink event for playback {}",
                            self.destination,
                            event.playback_id()
                        );
                        self.controller.on_sink_event(event).await
                    }
                    None => Err(QueueError::unreachable(
                        &self.destination,
                        "sink event channel closed",
                    )),
                },
                _ = interval.tick() => self.poll_presence(&mut last_presence).await,
            };

            match result {
                Ok(()) => {}
                Err(QueueError::Cancelled) => return None,
                Err(e) if e.is_fatal() => return Some(e),
                Err(e) => log::warn!("[Session] {}: {}", self.destination, e),
            }
        }
    }

    async fn poll_presence(&self, last: &mut Presence) -> QueueResult<()> {
        let presence = self.monitor.tick().await?;
        if presence != *last {
            log::debug!(
                "[Session] {}: presence {:?} -> {:?}",
                self.destination,
                last,
                presence
            );
            *last = presence;
            self.emitter.emit_session(SessionEvent::PresenceChanged {
                destination: self.destination.clone(),
                presence,
                timestamp: now_millis(),
            });
        }
        self.controller.on_presence(presence).await
    }
}
