//! Fixed constants shared across the application.
//!
//! Tunable behavior lives in [`crate::config::Config`]; the values here are
//! either identifiers or the defaults that `Config` starts from.

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Human-readable application name.
pub const APP_NAME: &str = "Encore";

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "encore-server";

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// First port tried when no preferred port is configured.
pub const PORT_RANGE_START: u16 = 49500;

/// Last port tried when no preferred port is configured.
pub const PORT_RANGE_END: u16 = 49510;

/// Origins allowed to call the HTTP API from a browser by default.
pub const DEFAULT_TRUSTED_ORIGINS: &[&str] = &["http://localhost", "http://127.0.0.1"];

/// Event-stream clients are dropped after this long without a message (seconds).
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 60;

/// How often event-stream connections are checked for inactivity (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Default prefix that marks a chat message as a command.
pub const DEFAULT_COMMAND_PREFIX: &str = "!";

// ─────────────────────────────────────────────────────────────────────────────
// Presence
// ─────────────────────────────────────────────────────────────────────────────

/// Default presence polling period (seconds).
///
/// Listener membership has no push notification, so presence is sampled.
pub const DEFAULT_PRESENCE_INTERVAL_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Relay
// ─────────────────────────────────────────────────────────────────────────────

/// Default pacing bitrate for the relay sink (kilobits per second).
pub const DEFAULT_RELAY_BITRATE_KBPS: u32 = 192;

/// Capacity of each destination's broadcast channel (chunks).
pub const DEFAULT_RELAY_CHANNEL_CAPACITY: usize = 256;

/// Maximum chunk size read from a media stream before it is relayed (bytes).
pub const RELAY_CHUNK_SIZE: usize = 8192;

/// Content type advertised to relay listeners.
pub const RELAY_CONTENT_TYPE: &str = "application/octet-stream";

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Media Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Default yt-dlp executable (resolved through `PATH`).
pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";

/// Default yt-dlp format selector for streaming.
pub const DEFAULT_YTDLP_FORMAT: &str = "bestaudio";

/// Timeout for a yt-dlp metadata lookup (seconds).
pub const YTDLP_RESOLVE_TIMEOUT_SECS: u64 = 30;
