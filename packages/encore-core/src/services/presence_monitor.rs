//! Listener presence polling.
//!
//! Destinations have no push notification for membership changes, so each
//! session polls its destination on a fixed interval and feeds the reading to
//! its [`QueueController`](super::QueueController).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{QueueError, QueueResult};
use crate::sink::{PresenceError, PresenceSource};

/// One presence reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// At least one listener is at the destination.
    Present,
    /// Only operators (or nobody) are at the destination.
    Absent,
    /// The destination could not be queried this time.
    #[default]
    Unknown,
}

/// Polls one destination for non-operator occupants.
pub struct PresenceMonitor {
    destination: String,
    source: Arc<dyn PresenceSource>,
    /// Occupant IDs always treated as operators.
    operator_ids: Arc<HashSet<String>>,
    interval: Duration,
}

impl PresenceMonitor {
    /// Creates a monitor for `destination`.
    pub fn new(
        destination: impl Into<String>,
        source: Arc<dyn PresenceSource>,
        operator_ids: Arc<HashSet<String>>,
        interval: Duration,
    ) -> Self {
        Self {
            destination: destination.into(),
            source,
            operator_ids,
            interval,
        }
    }

    /// Polling period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes one reading.
    ///
    /// Transient query failures read as [`Presence::Unknown`]. A destination
    /// that no longer exists is a `DestinationUnreachable` error.
    pub async fn tick(&self) -> QueueResult<Presence> {
        match self.source.occupants(&self.destination).await {
            Ok(occupants) => {
                let listeners = occupants
                    .iter()
                    .filter(|o| !o.is_operator && !self.operator_ids.contains(&o.id))
                    .count();
                log::trace!(
                    "[Presence] {}: {} occupant(s), {} listener(s)",
                    self.destination,
                    occupants.len(),
                    listeners
                );
                Ok(if listeners > 0 {
                    Presence::Present
                } else {
                    Presence::Absent
                })
            }
            Err(PresenceError::Unavailable(reason)) => {
                log::warn!(
                    "[Presence] Could not query {}: {}",
                    self.destination,
                    reason
                );
                Ok(Presence::Unknown)
            }
            Err(PresenceError::DestinationGone(reason)) => {
                Err(QueueError::unreachable(&self.destination, reason))
            }
        }
    }
}
