// Shout Relay WebSocket Protocol
//
// This module implements the frame types exchanged with the relay.
//
// Protocol flow:
// 1. Client sends "join" with the document id
// 2. Relay responds with "opened" containing the connection id
// 3. Client sends "shout" frames; the relay forwards each payload as a
//    "shout" frame to every other connection joined to the same document
// 4. Client sends "leave" (or closes the socket) to stop receiving shouts

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Relay frame - top-level message type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RelayFrame {
    /// Subscribe the connection to a document
    #[serde(rename = "join")]
    Join(JoinRequest),

    /// Broadcast payload (client -> relay) or relayed payload (relay -> client)
    #[serde(rename = "shout")]
    Shout(ShoutFrame),

    /// Unsubscribe from the current document
    #[serde(rename = "leave")]
    Leave {},

    /// Join acknowledgement
    #[serde(rename = "opened")]
    Opened(OpenedEvent),

    /// Request could not be served
    #[serde(rename = "error")]
    Error(ProtocolError),
}

impl RelayFrame {
    pub fn join(doc: impl Into<String>) -> Self {
        Self::Join(JoinRequest { doc: doc.into() })
    }

    pub fn shout(payload: JsonValue) -> Self {
        Self::Shout(ShoutFrame { payload })
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Document identifier
    pub doc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoutFrame {
    /// Opaque JSON payload; presence uses `[type, userId, ...args]`
    pub payload: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenedEvent {
    /// Joined document
    pub doc: String,

    /// Relay-assigned connection identifier
    pub connection_id: String,

    /// Number of connections on the document, this one included
    pub members: usize,
}

/// Protocol error type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
    /// Error code
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

impl ProtocolError {
    // Standard error codes
    pub const INVALID_REQUEST: &'static str = "INVALID_REQUEST";
    pub const NOT_JOINED: &'static str = "NOT_JOINED";
    pub const INTERNAL_ERROR: &'static str = "INTERNAL_ERROR";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

const MAX_DOCUMENT_ID_LENGTH: usize = 128;

/// Validate a document identifier supplied by a client
pub fn validate_document_id(doc: &str) -> Result<(), ProtocolError> {
    if doc.trim().is_empty() {
        return Err(ProtocolError::new(
            ProtocolError::INVALID_REQUEST,
            "Invalid document id: cannot be empty",
        ));
    }
    if doc.len() > MAX_DOCUMENT_ID_LENGTH {
        return Err(ProtocolError::new(
            ProtocolError::INVALID_REQUEST,
            format!(
                "Invalid document id: too long (max {})",
                MAX_DOCUMENT_ID_LENGTH
            ),
        ));
    }
    if !doc
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':'))
    {
        return Err(ProtocolError::new(
            ProtocolError::INVALID_REQUEST,
            "Invalid document id: contains unsupported characters",
        ));
    }
    Ok(())
}
