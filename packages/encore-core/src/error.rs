//! Centralized error types for the Encore core library.
//!
//! This module provides a unified error handling system that:
//! - Defines the queue error taxonomy using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::media::MediaError;
use crate::sink::{PresenceError, SinkError};

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for MediaError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "media_not_found",
            Self::EmptyPlaylist(_) => "empty_playlist",
            Self::Io(_) => "extractor_io_failed",
            Self::Extractor(_) => "extractor_failed",
            Self::Timeout(_) => "extractor_timeout",
        }
    }
}

impl ErrorCode for SinkError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "destination_unreachable",
            Self::Rejected(_) => "sink_rejected",
        }
    }
}

impl ErrorCode for PresenceError {
    fn code(&self) -> &'static str {
        match self {
            Self::DestinationGone(_) => "destination_gone",
            Self::Unavailable(_) => "presence_unavailable",
        }
    }
}

/// Errors surfaced by queue operations.
///
/// Every variant except [`QueueError::DestinationUnreachable`] is an
/// operation-level outcome reported back to the caller; that one ends the
/// session.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The media reference could not be identified.
    #[error("Could not resolve '{query}': {reason}")]
    Resolution { query: String, reason: String },

    /// The operation needs at least one queued track.
    #[error("The queue is empty")]
    EmptyQueue,

    /// The media source or sink failed while setting up a stream.
    #[error("Could not stream '{title}': {reason}")]
    Streaming { title: String, reason: String },

    /// A full lap of the playlist produced no successful play.
    #[error("No track in the queue could be played ({attempts} attempts)")]
    PlaybackExhausted { attempts: usize },

    /// The destination already has a session.
    #[error("Destination {0} already has an active session")]
    SessionConflict(String),

    /// The destination vanished or cannot be reached.
    #[error("Destination {destination} is unreachable: {reason}")]
    DestinationUnreachable { destination: String, reason: String },

    /// The session was stopped while the operation was in flight.
    #[error("Operation cancelled because the session stopped")]
    Cancelled,
}

impl QueueError {
    /// Builds a resolution error from a media failure.
    pub fn resolution(query: &str, err: &MediaError) -> Self {
        Self::Resolution {
            query: query.to_string(),
            reason: err.to_string(),
        }
    }

    /// Builds a destination-unreachable error.
    pub fn unreachable(destination: &str, reason: impl std::fmt::Display) -> Self {
        Self::DestinationUnreachable {
            destination: destination.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the session must be torn down.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DestinationUnreachable { .. })
    }
}

impl ErrorCode for QueueError {
    fn code(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "resolution_failed",
            Self::EmptyQueue => "queue_empty",
            Self::Streaming { .. } => "streaming_failed",
            Self::PlaybackExhausted { .. } => "playback_exhausted",
            Self::SessionConflict(_) => "session_conflict",
            Self::DestinationUnreachable { .. } => "destination_unreachable",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Convenient Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Application-wide error type for the Encore server.
#[derive(Debug, Error)]
pub enum EncoreError {
    /// A queue operation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// No session is bound to the destination.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The actor is not allowed to act on the destination.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EncoreError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Queue(e) => e.code(),
            Self::SessionNotFound(_) => "session_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Queue(e) => match e {
                QueueError::Resolution { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                QueueError::EmptyQueue
                | QueueError::SessionConflict(_)
                | QueueError::Cancelled => StatusCode::CONFLICT,
                QueueError::Streaming { .. } | QueueError::PlaybackExhausted { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                QueueError::DestinationUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type EncoreResult<T> = Result<T, EncoreError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for EncoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
