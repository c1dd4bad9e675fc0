use coedit_core::{ConfigError, PresenceError};
use std::fmt;

#[derive(Debug)]
pub enum CoeditError {
    // Configuration errors
    Config(ConfigError),

    // Presence hub errors
    Presence(PresenceError),

    // Relay server / connection errors
    Relay(anyhow::Error),

    // IO errors
    IoError(std::io::Error),
}

impl fmt::Display for CoeditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoeditError::Config(err) => write!(f, "Configuration error: {}", err),
            CoeditError::Presence(err) => write!(f, "Presence error: {}", err),
            CoeditError::Relay(err) => write!(f, "Relay error: {:#}", err),
            CoeditError::IoError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for CoeditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoeditError::Config(err) => Some(err),
            CoeditError::Presence(err) => Some(err),
            CoeditError::Relay(err) => Some(&**err),
            CoeditError::IoError(err) => Some(err),
        }
    }
}

impl From<ConfigError> for CoeditError {
    fn from(err: ConfigError) -> Self {
        CoeditError::Config(err)
    }
}

impl From<PresenceError> for CoeditError {
    fn from(err: PresenceError) -> Self {
        CoeditError::Presence(err)
    }
}

impl From<anyhow::Error> for CoeditError {
    fn from(err: anyhow::Error) -> Self {
        CoeditError::Relay(err)
    }
}

impl From<std::io::Error> for CoeditError {
    fn from(err: std::io::Error) -> Self {
        CoeditError::IoError(err)
    }
}
