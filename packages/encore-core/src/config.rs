//! Core configuration types.
//!
//! [`Config`] holds everything the core services need. The standalone server
//! builds it from its YAML/env/CLI layers; tests construct it directly.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COMMAND_PREFIX, DEFAULT_PRESENCE_INTERVAL_SECS, DEFAULT_RELAY_BITRATE_KBPS,
    DEFAULT_RELAY_CHANNEL_CAPACITY, DEFAULT_TRUSTED_ORIGINS, DEFAULT_YTDLP_FORMAT,
    DEFAULT_YTDLP_PATH, EVENT_CHANNEL_CAPACITY, YTDLP_RESOLVE_TIMEOUT_SECS,
};
use crate::utils::validate_destination_id;

/// Configuration for the yt-dlp media source.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to the yt-dlp executable.
    pub ytdlp_path: String,

    /// Format selector passed to `-f` when streaming.
    pub format: String,

    /// Timeout for metadata lookups (seconds).
    pub resolve_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: DEFAULT_YTDLP_PATH.to_string(),
            format: DEFAULT_YTDLP_FORMAT.to_string(),
            resolve_timeout_secs: YTDLP_RESOLVE_TIMEOUT_SECS,
        }
    }
}

/// Configuration for the HTTP relay sink.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    /// Nominal bitrate used to pace relayed audio (kbps).
    pub bitrate_kbps: u32,

    /// Capacity of each destination's broadcast channel (chunks).
    pub channel_capacity: usize,

    /// Destinations the relay accepts. Empty means any valid identifier.
    pub destinations: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bitrate_kbps: DEFAULT_RELAY_BITRATE_KBPS,
            channel_capacity: DEFAULT_RELAY_CHANNEL_CAPACITY,
            destinations: Vec::new(),
        }
    }
}

/// Configuration for the Encore core services.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Origin prefixes allowed by CORS.
    pub trusted_origins: Vec<String>,

    // Commands
    /// Prefix that marks a chat message as a command.
    pub command_prefix: String,

    // Presence
    /// Interval between presence checks (seconds).
    pub presence_interval_secs: u64,

    /// Occupant IDs treated as operators (never counted as listeners).
    pub operator_ids: Vec<String>,

    // Media / Relay
    /// Media source configuration.
    pub media: MediaConfig,

    /// Relay sink configuration.
    pub relay: RelayConfig,

    // Events
    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            trusted_origins: DEFAULT_TRUSTED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            presence_interval_secs: DEFAULT_PRESENCE_INTERVAL_SECS,
            operator_ids: Vec::new(),
            media: MediaConfig::default(),
            relay: RelayConfig::default(),
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first value that would cause runtime issues.
    pub fn validate(&self) -> Result<(), String> {
        if self.command_prefix.is_empty() {
            return Err("command_prefix must not be empty".to_string());
        }
        if self.command_prefix.chars().any(char::is_whitespace) {
            return Err("command_prefix must not contain whitespace".to_string());
        }
        if self.presence_interval_secs == 0 {
            return Err("presence_interval_secs must be >= 1".to_string());
        }
        if self.relay.bitrate_kbps == 0 {
            return Err("relay.bitrate_kbps must be >= 1".to_string());
        }
        if self.relay.channel_capacity == 0 {
            return Err(
                "relay.channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.media.ytdlp_path.trim().is_empty() {
            return Err("media.ytdlp_path must not be empty".to_string());
        }
        for id in &self.relay.destinations {
            validate_destination_id(id).map_err(|e| format!("relay.destinations '{id}': {e}"))?;
        }
        Ok(())
    }
}
