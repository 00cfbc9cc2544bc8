//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{QueueEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// Queue controllers and the session registry use this trait to emit events,
/// decoupling them from how events reach clients (WebSocket, logs, tests).
pub trait EventEmitter: Send + Sync {
    /// Emits a queue activity event.
    fn emit_queue(&self, event: QueueEvent);

    /// Emits a session lifecycle event.
    fn emit_session(&self, event: SessionEvent);
}

/// No-op emitter for tests and embedded use.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_queue(&self, _event: QueueEvent) {}

    fn emit_session(&self, _event: SessionEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_queue(&self, event: QueueEvent) {
        tracing::debug!(?event, "queue_event");
    }

    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }
}
