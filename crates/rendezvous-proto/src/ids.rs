//! Identifiers carried in frames.
//!
//! The server is not consistent about numeric encodings: conversation ids
//! arrive as JSON numbers on push events but as strings in some REST payloads,
//! and message ids may be either. Both spellings decode to the same value so
//! equality checks never depend on which channel delivered an id.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Server-assigned conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConversationId(pub u64);

impl ConversationId {
    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConversationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(n) => Ok(Self(n)),
            NumberOrText::Text(s) => s
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| de::Error::custom(format!("invalid conversation id: {s:?}"))),
        }
    }
}

/// Server-assigned message identifier.
///
/// Numeric strings are normalized to [`MessageId::Number`] on decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageId {
    /// Integer primary key
    Number(u64),
    /// Opaque string key
    Text(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        value.parse().map_or_else(|_| Self::Text(value.to_string()), Self::Number)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_u64(*n),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(n) => Self::Number(n),
            NumberOrText::Text(s) => Self::from(s.as_str()),
        })
    }
}

/// Message content kind.
///
/// Unknown kinds are preserved verbatim so a newer server never makes a frame
/// undecodable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum MessageType {
    /// Plain text
    #[default]
    Text,
    /// Image attachment
    Image,
    /// Any other server-defined kind
    Other(String),
}

impl MessageType {
    /// Wire spelling.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::Other(s) => s,
        }
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "TEXT" => Self::Text,
            "IMAGE" => Self::Image,
            _ => Self::Other(raw),
        })
    }
}
