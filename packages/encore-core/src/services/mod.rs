//! Application services layer.
//!
//! This module contains the queue controller and the services that feed it:
//! presence polling, per-destination sessions and command routing.

pub mod command_router;
pub mod presence_monitor;
pub mod queue_controller;
pub mod session;
pub mod session_registry;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use command_router::{CommandContext, CommandReply, CommandRouter, HELP_REPLY};
pub use presence_monitor::{Presence, PresenceMonitor};
pub use queue_controller::{QueueController, QueueSnapshot, SessionState};
pub use session::PlaybackSession;
pub use session_registry::{SessionRegistry, SessionSettings};
