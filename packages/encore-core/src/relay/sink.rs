//! Playback sink that pumps media into a relay channel.
//!
//! Each `play` starts a pump task that reads the media stream and publishes
//! chunks paced at the configured bitrate. Replacing or stopping a pump
//! cancels it without emitting events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::RelayChannel;
use crate::media::{MediaStream, Track};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::sink::{PlaybackSink, SinkError, SinkEvent, SinkResult, SinkState};

/// Control handles for the running pump.
struct Pump {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
}

/// [`PlaybackSink`] backed by a [`RelayChannel`].
pub struct RelaySink {
    destination: String,
    channel: Arc<RelayChannel>,
    events: mpsc::UnboundedSender<SinkEvent>,
    bytes_per_sec: u64,
    state: Arc<Mutex<SinkState>>,
    pump: Mutex<Option<Pump>>,
    spawner: TokioSpawner,
}

impl RelaySink {
    pub fn new(
        destination: impl Into<String>,
        channel: Arc<RelayChannel>,
        events: mpsc::UnboundedSender<SinkEvent>,
        bitrate_kbps: u32,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            destination: destination.into(),
            channel,
            events,
            bytes_per_sec: (u64::from(bitrate_kbps) * 1000 / 8).max(1),
            state: Arc::new(Mutex::new(SinkState::Idle)),
            pump: Mutex::new(None),
            spawner,
        }
    }

    fn check_open(&self) -> SinkResult<()> {
        if self.channel.is_closed() {
            Err(SinkError::Unreachable(format!(
                "relay mount {} is closed",
                self.destination
            )))
        } else {
            Ok(())
        }
    }

    fn set_paused(&self, paused: bool) -> SinkResult<()> {
        self.check_open()?;
        let pump = self.pump.lock();
        let Some(pump) = pump.as_ref() else {
            return Err(SinkError::Rejected("nothing is playing".into()));
        };
        // Receiver lives as long as the pump task; a finished pump has nothing to hold.
        if pump.paused.send(paused).is_err() {
            return Err(SinkError::Rejected("playback already finished".into()));
        }
        *self.state.lock() = if paused {
            SinkState::Paused
        } else {
            SinkState::Playing
        };
        Ok(())
    }
}

/// Time it takes to play `len` bytes at `bytes_per_sec`.
fn pace(len: usize, bytes_per_sec: u64) -> Duration {
    Duration::from_secs_f64(len as f64 / bytes_per_sec as f64)
}

struct PumpTask {
    playback_id: u64,
    stream: MediaStream,
    channel: Arc<RelayChannel>,
    events: mpsc::UnboundedSender<SinkEvent>,
    state: Arc<Mutex<SinkState>>,
    paused: watch::Receiver<bool>,
    cancel: CancellationToken,
    bytes_per_sec: u64,
}

impl PumpTask {
    async fn run(mut self) {
        loop {
            // Hold while paused
            loop {
                let is_paused = *self.paused.borrow_and_update();
                if !is_paused {
                    break;
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    changed = self.paused.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }

            let next = tokio::select! {
                _ = self.cancel.cancelled() => return,
                next = self.stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    let delay = pace(chunk.len(), self.bytes_per_sec);
                    self.channel.publish(chunk);
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Some(Err(e)) => {
                    self.finish(
                        SinkState::Error,
                        SinkEvent::Error {
                            playback_id: self.playback_id,
                            message: e.to_string(),
                        },
                    );
                    return;
                }
                None => {
                    self.finish(
                        SinkState::Idle,
                        SinkEvent::Idle {
                            playback_id: self.playback_id,
                        },
                    );
                    return;
                }
            }
        }
    }

    fn finish(&self, state: SinkState, event: SinkEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        *self.state.lock() = state;
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl PlaybackSink for RelaySink {
    async fn play(&self, playback_id: u64, track: &Track, stream: MediaStream) -> SinkResult<()> {
        self.check_open()?;

        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);

        if let Some(old) = self.pump.lock().replace(Pump {
            cancel: cancel.clone(),
            paused: paused_tx,
        }) {
            old.cancel.cancel();
        }
        *self.state.lock() = SinkState::Playing;

        log::info!(
            "[Relay] {}: streaming '{}' (playback {})",
            self.destination,
            track.title(),
            playback_id
        );

        let task = PumpTask {
            playback_id,
            stream,
            channel: Arc::clone(&self.channel),
            events: self.events.clone(),
            state: Arc::clone(&self.state),
            paused: paused_rx,
            cancel,
            bytes_per_sec: self.bytes_per_sec,
        };
        self.spawner.spawn(task.run());
        Ok(())
    }

    async fn pause(&self) -> SinkResult<()> {
        self.set_paused(true)
    }

    async fn unpause(&self) -> SinkResult<()> {
        self.set_paused(false)
    }

    async fn stop(&self) -> SinkResult<()> {
        if let Some(old) = self.pump.lock().take() {
            old.cancel.cancel();
        }
        *self.state.lock() = SinkState::Idle;
        Ok(())
    }

    fn state(&self) -> SinkState {
        *self.state.lock()
    }
}
