// Presence wire format
//
// Shouts travel as JSON arrays `[type, userId, ...args]`:
//   ["open", u]  ["focus", u, path]  ["close", u]  ["ping", u]
// Field paths are `fields.<fieldId>.<localeCode>`.

use crate::error::ShoutError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

const FIELD_PATH_PREFIX: &str = "fields.";

/// One presence message exchanged between the clients of a document
#[derive(Debug, Clone, PartialEq)]
pub enum ShoutMessage {
    /// Sender just joined the document
    Open { user_id: String },
    /// Sender is editing the field at `path`
    Focus { user_id: String, path: String },
    /// Sender is leaving the document
    Close { user_id: String },
    /// Keep-alive without focus change
    Ping { user_id: String },
    /// Message type this version does not know about
    Other {
        kind: String,
        user_id: String,
        args: Vec<JsonValue>,
    },
}

impl ShoutMessage {
    pub fn open(user_id: impl Into<String>) -> Self {
        Self::Open {
            user_id: user_id.into(),
        }
    }

    pub fn focus(user_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Focus {
            user_id: user_id.into(),
            path: path.into(),
        }
    }

    pub fn close(user_id: impl Into<String>) -> Self {
        Self::Close {
            user_id: user_id.into(),
        }
    }

    pub fn ping(user_id: impl Into<String>) -> Self {
        Self::Ping {
            user_id: user_id.into(),
        }
    }

    /// Message type as it appears on the wire
    pub fn kind(&self) -> &str {
        match self {
            Self::Open { .. } => "open",
            Self::Focus { .. } => "focus",
            Self::Close { .. } => "close",
            Self::Ping { .. } => "ping",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Identity of the sender
    pub fn user_id(&self) -> &str {
        match self {
            Self::Open { user_id }
            | Self::Focus { user_id, .. }
            | Self::Close { user_id }
            | Self::Ping { user_id }
            | Self::Other { user_id, .. } => user_id,
        }
    }

    /// Encode as the `[type, userId, ...args]` tuple
    pub fn to_value(&self) -> JsonValue {
        let mut parts = vec![
            JsonValue::String(self.kind().to_string()),
            JsonValue::String(self.user_id().to_string()),
        ];
        match self {
            Self::Focus { path, .. } => parts.push(JsonValue::String(path.clone())),
            Self::Other { args, .. } => parts.extend(args.iter().cloned()),
            _ => {}
        }
        JsonValue::Array(parts)
    }

    /// Decode a `[type, userId, ...args]` tuple
    pub fn from_value(value: &JsonValue) -> Result<Self, ShoutError> {
        let parts = value
            .as_array()
            .ok_or_else(|| ShoutError::Malformed(format!("expected an array, got {}", value)))?;

        let (kind, user_id) = match (parts.first(), parts.get(1)) {
            (Some(JsonValue::String(kind)), Some(JsonValue::String(user_id))) => {
                (kind.as_str(), user_id.clone())
            }
            _ => {
                return Err(ShoutError::Malformed(
                    "expected [type, userId, ...] with string type and userId".to_string(),
                ))
            }
        };

        let message = match kind {
            "open" => Self::Open { user_id },
            "close" => Self::Close { user_id },
            "ping" => Self::Ping { user_id },
            "focus" => match parts.get(2) {
                Some(JsonValue::String(path)) => {
                    let path = FieldPath::parse(path).ok_or_else(|| {
                        ShoutError::Malformed(format!("'{}' is not a field path", path))
                    })?;
                    Self::Focus {
                        user_id,
                        path: path.into(),
                    }
                }
                _ => {
                    return Err(ShoutError::Malformed(
                        "focus message without a string path".to_string(),
                    ))
                }
            },
            other => Self::Other {
                kind: other.to_string(),
                user_id,
                args: parts[2..].to_vec(),
            },
        };
        Ok(message)
    }
}

impl Serialize for ShoutMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ShoutMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Self::from_value(&value).map_err(D::Error::custom)
    }
}

/// Event delivered by a document connection
#[derive(Debug, Clone, PartialEq)]
pub enum DocEvent {
    /// The connection to the document was (re)opened
    Open,
    /// A shout from another client of the document
    Shout(ShoutMessage),
    /// Any other document event, ignored by presence
    Other { name: String },
}

/// Encoded field + locale identifier, `fields.<fieldId>.<localeCode>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(field_id: &str, locale_code: &str) -> Self {
        Self(format!("{}{}.{}", FIELD_PATH_PREFIX, field_id, locale_code))
    }

    /// Parse an encoded path received from a peer
    pub fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix(FIELD_PATH_PREFIX)?;
        let (field_id, locale_code) = rest.split_once('.')?;
        if field_id.is_empty() || locale_code.is_empty() {
            return None;
        }
        Some(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.0
    }
}

/// Link reference to a user, `{sys: {type: "Link", linkType: "User", id}}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserLink {
    pub sys: LinkSys,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkSys {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "linkType")]
    pub link_type: String,
    pub id: String,
}

impl UserLink {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            sys: LinkSys {
                kind: "Link".to_string(),
                link_type: "User".to_string(),
                id: id.into(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.sys.id
    }
}
