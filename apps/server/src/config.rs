//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use encore_core::constants::{
    DEFAULT_COMMAND_PREFIX, DEFAULT_PRESENCE_INTERVAL_SECS, DEFAULT_RELAY_BITRATE_KBPS,
    DEFAULT_YTDLP_FORMAT, DEFAULT_YTDLP_PATH,
};
use encore_core::{Config, MediaConfig, RelayConfig};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port in the default range).
    /// Override: `ENCORE_BIND_PORT`
    pub bind_port: u16,

    /// Prefix that marks a chat message as a command.
    /// Override: `ENCORE_COMMAND_PREFIX`
    pub command_prefix: String,

    /// Seconds between presence checks.
    /// Override: `ENCORE_PRESENCE_INTERVAL`
    pub presence_interval_secs: u64,

    /// Occupant IDs that never count as listeners.
    pub operator_ids: Vec<String>,

    /// Destinations that may be joined. Empty accepts any valid identifier.
    /// Override: `ENCORE_DESTINATIONS` (comma-separated)
    pub destinations: Vec<String>,

    /// Origin prefixes allowed to call the API from a browser.
    pub trusted_origins: Option<Vec<String>>,

    /// Path to the yt-dlp executable.
    /// Override: `ENCORE_YTDLP_PATH`
    pub ytdlp_path: String,

    /// yt-dlp format selector used for streaming.
    pub ytdlp_format: String,

    /// Pacing bitrate for relayed audio (kbps).
    /// Override: `ENCORE_RELAY_BITRATE`
    pub relay_bitrate_kbps: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 0,
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            presence_interval_secs: DEFAULT_PRESENCE_INTERVAL_SECS,
            operator_ids: Vec::new(),
            destinations: Vec::new(),
            trusted_origins: None,
            ytdlp_path: DEFAULT_YTDLP_PATH.to_string(),
            ytdlp_format: DEFAULT_YTDLP_FORMAT.to_string(),
            relay_bitrate_kbps: DEFAULT_RELAY_BITRATE_KBPS,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Applies `ENCORE_*` overrides read through `var`.
    ///
    /// Unparseable values are ignored.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("ENCORE_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }
        if let Some(prefix) = var("ENCORE_COMMAND_PREFIX") {
            self.command_prefix = prefix;
        }
        if let Some(secs) = var("ENCORE_PRESENCE_INTERVAL").and_then(|v| v.parse().ok()) {
            self.presence_interval_secs = secs;
        }
        if let Some(list) = var("ENCORE_DESTINATIONS") {
            self.destinations = list
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(path) = var("ENCORE_YTDLP_PATH") {
            self.ytdlp_path = path;
        }
        if let Some(kbps) = var("ENCORE_RELAY_BITRATE").and_then(|v| v.parse().ok()) {
            self.relay_bitrate_kbps = kbps;
        }
    }

    /// Converts to encore-core's Config type.
    pub fn to_core_config(&self) -> Config {
        let defaults = Config::default();
        Config {
            preferred_port: self.bind_port,
            trusted_origins: self
                .trusted_origins
                .clone()
                .unwrap_or(defaults.trusted_origins),
            command_prefix: self.command_prefix.clone(),
            presence_interval_secs: self.presence_interval_secs,
            operator_ids: self.operator_ids.clone(),
            media: MediaConfig {
                ytdlp_path: self.ytdlp_path.clone(),
                format: self.ytdlp_format.clone(),
                ..defaults.media
            },
            relay: RelayConfig {
                bitrate_kbps: self.relay_bitrate_kbps,
                destinations: self.destinations.clone(),
                ..defaults.relay
            },
            ..Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_path_yields_defaults() {
        let config = ServerConfig::from_file(None).unwrap();
        assert_eq!(config.bind_port, 0);
        assert_eq!(config.command_prefix, "!");
        assert!(config.to_core_config().validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let file = write_yaml("bind_port: 8080\ndestinations: [lounge, patio]\n");
        let config = ServerConfig::from_file(Some(file.path())).unwrap();
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.destinations, vec!["lounge", "patio"]);
        assert_eq!(config.presence_interval_secs, DEFAULT_PRESENCE_INTERVAL_SECS);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let file = write_yaml("bind_port: [not a port\n");
        let err = ServerConfig::from_file(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        let err = ServerConfig::from_file(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("ENCORE_BIND_PORT", "9000"),
            ("ENCORE_COMMAND_PREFIX", "?"),
            ("ENCORE_DESTINATIONS", " lounge , ,patio"),
            ("ENCORE_RELAY_BITRATE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind_port, 9000);
        assert_eq!(config.command_prefix, "?");
        assert_eq!(config.destinations, vec!["lounge", "patio"]);
        assert_eq!(config.relay_bitrate_kbps, DEFAULT_RELAY_BITRATE_KBPS);
    }

    #[test]
    fn core_config_carries_every_setting() {
        let config = ServerConfig {
            bind_port: 8080,
            operator_ids: vec!["bot".into()],
            destinations: vec!["lounge".into()],
            ytdlp_path: "/opt/yt-dlp".into(),
            relay_bitrate_kbps: 128,
            ..Default::default()
        };
        let core = config.to_core_config();
        assert_eq!(core.preferred_port, 8080);
        assert_eq!(core.operator_ids, vec!["bot"]);
        assert_eq!(core.relay.destinations, vec!["lounge"]);
        assert_eq!(core.relay.bitrate_kbps, 128);
        assert_eq!(core.media.ytdlp_path, "/opt/yt-dlp");
        assert!(!core.trusted_origins.is_empty());
    }
}
