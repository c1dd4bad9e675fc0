//! coedit Configuration
//!
//! Configuration structures with serde defaults. Every section may be omitted
//! from the YAML file, in which case the built-in defaults apply.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Minimum time between two broadcasts of the same focus announcement (seconds)
pub const DEFAULT_THROTTLE_WINDOW_SECS: u64 = 10;
/// Interval between two sweeps of the presence table (seconds)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
/// Silence after which a peer is considered gone (seconds)
pub const DEFAULT_PRESENCE_TIMEOUT_SECS: u64 = 60;
/// Default relay host
pub const DEFAULT_RELAY_HOST: &str = "127.0.0.1";
/// Default relay port
pub const DEFAULT_RELAY_PORT: u16 = 18790;
/// Per-document broadcast buffer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
/// Default relay URL used by clients
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:18790";
/// Keep-alive interval of the watch client (seconds)
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;
/// Upper bound for every interval setting (one day)
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Intervals are added to `Instant`s, so keep them within `MAX_INTERVAL_SECS`
fn bounded_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.min(MAX_INTERVAL_SECS))
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// ============================================================================
// Main Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Presence hub timing
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Shout relay server
    #[serde(default)]
    pub relay: RelayConfig,
    /// Relay client used by `coedit watch`
    #[serde(default)]
    pub client: ClientConfig,
}

// ============================================================================
// Presence Config
// ============================================================================

/// Timing of the presence hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "PresenceConfig::default_throttle_window_secs")]
    pub throttle_window_secs: u64,
    #[serde(default = "PresenceConfig::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "PresenceConfig::default_presence_timeout_secs")]
    pub presence_timeout_secs: u64,
}

impl PresenceConfig {
    fn default_throttle_window_secs() -> u64 {
        DEFAULT_THROTTLE_WINDOW_SECS
    }
    fn default_sweep_interval_secs() -> u64 {
        DEFAULT_SWEEP_INTERVAL_SECS
    }
    fn default_presence_timeout_secs() -> u64 {
        DEFAULT_PRESENCE_TIMEOUT_SECS
    }

    pub fn throttle_window(&self) -> Duration {
        bounded_secs(self.throttle_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        bounded_secs(self.sweep_interval_secs)
    }

    pub fn presence_timeout(&self) -> Duration {
        bounded_secs(self.presence_timeout_secs)
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            throttle_window_secs: DEFAULT_THROTTLE_WINDOW_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            presence_timeout_secs: DEFAULT_PRESENCE_TIMEOUT_SECS,
        }
    }
}

// ============================================================================
// Relay Config
// ============================================================================

/// Shout relay server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "RelayConfig::default_host")]
    pub host: String,
    #[serde(default = "RelayConfig::default_port")]
    pub port: u16,
    /// Buffered shouts per document before slow connections start lagging
    #[serde(default = "RelayConfig::default_channel_capacity")]
    pub channel_capacity: usize,
}

impl RelayConfig {
    fn default_host() -> String {
        DEFAULT_RELAY_HOST.to_string()
    }
    fn default_port() -> u16 {
        DEFAULT_RELAY_PORT
    }
    fn default_channel_capacity() -> usize {
        DEFAULT_CHANNEL_CAPACITY
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RELAY_HOST.to_string(),
            port: DEFAULT_RELAY_PORT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

// ============================================================================
// Client Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay WebSocket URL
    #[serde(default = "ClientConfig::default_url")]
    pub url: String,
    /// Interval of keep-alive announcements, must stay below the presence timeout
    #[serde(default = "ClientConfig::default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl ClientConfig {
    fn default_url() -> String {
        DEFAULT_RELAY_URL.to_string()
    }
    fn default_keepalive_secs() -> u64 {
        DEFAULT_KEEPALIVE_SECS
    }

    pub fn keepalive(&self) -> Duration {
        bounded_secs(self.keepalive_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
        }
    }
}

// ============================================================================
// Config Loading and Validation
// ============================================================================

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from an explicit path, the default locations, or fall
    /// back to the built-in defaults when no file exists.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound {
                        path: p.display().to_string(),
                    });
                }
                Some(p.to_path_buf())
            }
            None => Self::default_paths().into_iter().find(|p| p.exists()),
        };

        let config = match config_path {
            Some(p) => {
                tracing::debug!("Loading config from {:?}", p);
                let content = std::fs::read_to_string(&p)?;
                serde_yml::from_str(&content)
                    .map_err(|e| ConfigError::Parse(format!("{}: {}", p.display(), e)))?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Config::default()
            }
        };

        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    fn default_paths() -> Vec<PathBuf> {
        vec![
            home_dir().join(".coedit/config.yaml"),
            PathBuf::from("./coedit.yaml"),
        ]
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let presence = &config.presence;
        for (field, value) in [
            ("presence.throttle_window_secs", presence.throttle_window_secs),
            ("presence.sweep_interval_secs", presence.sweep_interval_secs),
            ("presence.presence_timeout_secs", presence.presence_timeout_secs),
            ("client.keepalive_secs", config.client.keepalive_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            if value > MAX_INTERVAL_SECS {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: format!("must be at most {} seconds", MAX_INTERVAL_SECS),
                });
            }
        }

        if config.relay.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "relay.channel_capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if !config.client.url.starts_with("ws://") && !config.client.url.starts_with("wss://") {
            return Err(ConfigError::Invalid {
                field: "client.url".to_string(),
                reason: format!("'{}' is not a ws:// or wss:// URL", config.client.url),
            });
        }

        Ok(())
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_yml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Generate a sample configuration
    pub fn sample() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.presence.throttle_window(), Duration::from_secs(10));
        assert_eq!(config.presence.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.presence.presence_timeout(), Duration::from_secs(60));
        assert_eq!(config.relay.bind_addr(), "127.0.0.1:18790");
        assert_eq!(config.client.url, DEFAULT_RELAY_URL);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yml::from_str("presence:\n  throttle_window_secs: 3\n").unwrap();
        assert_eq!(config.presence.throttle_window_secs, 3);
        assert_eq!(config.presence.sweep_interval_secs, DEFAULT_SWEEP_INTERVAL_SECS);
        assert_eq!(config.relay, RelayConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coedit.yaml");
        let mut config = Config::sample();
        config.relay.port = 4000;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_load_rejects_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coedit.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "presence:\n  sweep_interval_secs: 0").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "presence.sweep_interval_secs"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_rejects_oversized_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coedit.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "presence:\n  sweep_interval_secs: 18446744073709551615").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "presence.sweep_interval_secs"),
            other => panic!("unexpected error: {other}"),
        }

        let mut config = Config::default();
        config.client.keepalive_secs = MAX_INTERVAL_SECS + 1;
        assert!(ConfigValidator::validate(&config).is_err());
        config.client.keepalive_secs = MAX_INTERVAL_SECS;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_interval_accessors_are_bounded() {
        let presence = PresenceConfig {
            throttle_window_secs: u64::MAX,
            sweep_interval_secs: u64::MAX,
            presence_timeout_secs: u64::MAX,
        };
        let max = Duration::from_secs(MAX_INTERVAL_SECS);
        assert_eq!(presence.throttle_window(), max);
        assert_eq!(presence.sweep_interval(), max);
        assert_eq!(presence.presence_timeout(), max);
    }

    #[test]
    fn test_validate_rejects_http_url() {
        let mut config = Config::default();
        config.client.url = "http://localhost".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
