//! Message payload wrapper.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Metadata travelling with a message, separate from its payload.
pub type MessageContext = HashMap<String, serde_json::Value>;

/// The payload of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageData {
    /// No payload at all.
    #[default]
    Null,
    /// Character data.
    Text(String),
    /// Binary data, base64 encoded when serialized.
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A message flowing through a pipeline.
///
/// Pipes treat messages as values: a pipe receives one, and returns a new one
/// in its [`PipeRunResult`](super::PipeRunResult).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    data: MessageData,
    context: MessageContext,
}

impl Message {
    /// Creates a text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            data: MessageData::Text(text.into()),
            context: MessageContext::new(),
        }
    }

    /// Creates a binary message.
    #[must_use]
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: MessageData::Binary(bytes.into()),
            context: MessageContext::new(),
        }
    }

    /// Creates a message without payload.
    #[must_use]
    pub fn null() -> Self {
        Self::default()
    }

    /// Returns the payload.
    #[must_use]
    pub fn data(&self) -> &MessageData {
        &self.data
    }

    /// Returns true if the message has no payload.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.data, MessageData::Null)
    }

    /// Returns true if the message has no payload or a zero-length one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.data {
            MessageData::Null => true,
            MessageData::Text(s) => s.is_empty(),
            MessageData::Binary(b) => b.is_empty(),
        }
    }

    /// Returns the payload size in bytes, or `None` for a null message.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match &self.data {
            MessageData::Null => None,
            MessageData::Text(s) => Some(s.len()),
            MessageData::Binary(b) => Some(b.len()),
        }
    }

    /// Returns the payload as text. Binary data is decoded lossily.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match &self.data {
            MessageData::Null => None,
            MessageData::Text(s) => Some(Cow::Borrowed(s.as_str())),
            MessageData::Binary(b) => Some(String::from_utf8_lossy(b)),
        }
    }

    /// Returns the payload as an owned string.
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        self.as_text().map(Cow::into_owned)
    }

    /// Returns the raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            MessageData::Null => None,
            MessageData::Text(s) => Some(s.as_bytes()),
            MessageData::Binary(b) => Some(b.as_slice()),
        }
    }

    /// Returns the message context.
    #[must_use]
    pub fn context(&self) -> &MessageContext {
        &self.context
    }

    /// Returns the message context for modification.
    pub fn context_mut(&mut self) -> &mut MessageContext {
        &mut self.context
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Replaces the payload, keeping the context.
    #[must_use]
    pub fn with_data(mut self, data: MessageData) -> Self {
        self.data = data;
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            MessageData::Null => write!(f, "null"),
            MessageData::Text(s) => write!(f, "{s}"),
            MessageData::Binary(b) => write!(f, "<binary {} bytes>", b.len()),
        }
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Self::binary(value)
    }
}

impl From<Option<String>> for Message {
    fn from(value: Option<String>) -> Self {
        value.map_or_else(Self::null, Self::text)
    }
}
