//! coedit Error Types
//!
//! - `ShoutError`: the broadcast primitive could not deliver or decode a message
//! - `PresenceError`: a presence hub operation failed
//! - `ConfigError`: configuration could not be located, parsed or validated

use thiserror::Error;

/// Failures of the shout broadcast primitive
#[derive(Debug, Error)]
pub enum ShoutError {
    /// The underlying document connection is gone
    #[error("shout channel closed")]
    Closed,
    /// A payload is not a `[type, userId, ...args]` tuple
    #[error("malformed shout payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum PresenceError {
    /// The hub was destroyed; no further operations or updates are possible
    #[error("presence hub destroyed")]
    Destroyed,
    #[error("shout failed: {0}")]
    Shout(#[from] ShoutError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found: {path}")]
    NotFound { path: String },
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config invalid [{field}]: {reason}")]
    Invalid { field: String, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shout_error_converts_into_presence_error() {
        let err: PresenceError = ShoutError::Closed.into();
        assert!(matches!(err, PresenceError::Shout(ShoutError::Closed)));
        assert_eq!(err.to_string(), "shout failed: shout channel closed");
    }

    #[test]
    fn test_config_invalid_display() {
        let err = ConfigError::Invalid {
            field: "relay.port".to_string(),
            reason: "must not be zero".to_string(),
        };
        assert_eq!(err.to_string(), "config invalid [relay.port]: must not be zero");
    }
}
