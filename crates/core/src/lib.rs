pub mod config;
pub mod error;
pub mod presence;

// Re-export commonly used types
pub use config::{ClientConfig, Config, ConfigLoader, PresenceConfig, RelayConfig};
pub use error::{ConfigError, PresenceError, ShoutError};
pub use presence::{
    DocEvent, FieldPath, LiveValue, PresenceHub, PresenceView, ShoutChannel, ShoutMessage,
    UserLink,
};
