//! Per-destination broadcast channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::sink::Occupant;

/// Audio fan-out for one destination.
pub struct RelayChannel {
    tx: broadcast::Sender<Bytes>,
    /// listener ID -> label (usually the remote address)
    listeners: DashMap<u64, String>,
    next_listener: AtomicU64,
    closed: CancellationToken,
}

impl RelayChannel {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            listeners: DashMap::new(),
            next_listener: AtomicU64::new(1),
            closed: CancellationToken::new(),
        }
    }

    /// Sends a chunk to every listener. Returns the number of receivers.
    pub fn publish(&self, chunk: Bytes) -> usize {
        self.tx.send(chunk).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Connected listeners as presence occupants.
    pub fn occupants(&self) -> Vec<Occupant> {
        let mut occupants: Vec<(u64, String)> = self
            .listeners
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        occupants.sort_by_key(|(id, _)| *id);
        occupants
            .into_iter()
            .map(|(id, label)| Occupant::listener(format!("{label}#{id}")))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves when the channel is closed.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.closed.clone().cancelled_owned()
    }
}

/// Registration of one listener; unregisters on drop.
pub struct ListenerGuard {
    channel: Arc<RelayChannel>,
    id: u64,
}

impl ListenerGuard {
    /// Resolves when the listener's channel is closed.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.channel.closed()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.channel.listeners.remove(&self.id);
    }
}

/// All relay mounts, keyed by destination.
pub struct RelayHub {
    channels: DashMap<String, Arc<RelayChannel>>,
    capacity: usize,
}

impl RelayHub {
    /// Creates a hub whose channels buffer `capacity` chunks per listener.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Returns the destination's channel, creating it if needed.
    pub fn open(&self, destination: &str) -> Arc<RelayChannel> {
        let channel = self
            .channels
            .entry(destination.to_string())
            .or_insert_with(|| Arc::new(RelayChannel::new(self.capacity)));
        Arc::clone(channel.value())
    }

    pub fn get(&self, destination: &str) -> Option<Arc<RelayChannel>> {
        self.channels.get(destination).map(|c| Arc::clone(c.value()))
    }

    /// Removes a destination's channel.
    ///
    /// Listeners see their stream end once buffered chunks drain.
    pub fn close(&self, destination: &str) -> bool {
        let removed = self.channels.remove(destination);
        Self::finish_close(destination, removed)
    }

    /// Removes `channel` only if it is still the destination's mount.
    ///
    /// A mount reopened under the same name is left alone.
    pub fn close_channel(&self, destination: &str, channel: &Arc<RelayChannel>) -> bool {
        let removed = self
            .channels
            .remove_if(destination, |_, current| Arc::ptr_eq(current, channel));
        if removed.is_none() {
            // Still end the stale channel's listeners.
            channel.closed.cancel();
        }
        Self::finish_close(destination, removed)
    }

    fn finish_close(destination: &str, removed: Option<(String, Arc<RelayChannel>)>) -> bool {
        match removed {
            Some((_, channel)) => {
                channel.closed.cancel();
                log::info!("[Relay] Closed mount {}", destination);
                true
            }
            None => false,
        }
    }

    /// Attaches a listener to an open destination.
    pub fn subscribe(
        &self,
        destination: &str,
        label: impl Into<String>,
    ) -> Option<(broadcast::Receiver<Bytes>, ListenerGuard)> {
        let channel = self.get(destination)?;
        let id = channel.next_listener.fetch_add(1, Ordering::Relaxed);
        channel.listeners.insert(id, label.into());
        let rx = channel.tx.subscribe();
        Some((rx, ListenerGuard { channel, id }))
    }

    /// Drops every channel.
    pub fn close_all(&self) -> usize {
        let destinations: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        destinations.iter().filter(|d| self.close(d)).count()
    }
}
