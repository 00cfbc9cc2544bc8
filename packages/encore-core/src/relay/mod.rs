//! HTTP audio relay.
//!
//! The relay is the built-in destination type: each destination is a mount
//! point that HTTP listeners attach to at `/stream/{id}/live`. Connected
//! listeners count as occupants for presence purposes.

mod gateway;
mod hub;
mod sink;

pub use gateway::RelayGateway;
pub use hub::{ListenerGuard, RelayChannel, RelayHub};
pub use sink::RelaySink;
