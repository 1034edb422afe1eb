//! Rendering of failures into error messages.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

use crate::core::{Message, MessageData};
use crate::errors::PipeRunError;

/// Turns a failure into a message that can be routed like any other result.
pub trait ErrorMessageFormatter: Send + Sync + fmt::Debug {
    /// Formats an error message.
    ///
    /// * `location` - The pipe or pipeline that failed
    /// * `cause` - The failure
    /// * `input` - The message being processed when the failure occurred
    /// * `message_id` - The id of the message
    /// * `received` - When the message was received
    fn format(
        &self,
        location: &str,
        cause: &PipeRunError,
        input: Option<&Message>,
        message_id: Option<&str>,
        received: Option<DateTime<Utc>>,
    ) -> Message;
}

/// Renders error messages as JSON documents.
///
/// ```json
/// {"errorMessage": {"timestamp": "...", "originator": "pipeflow", "message": "...",
///   "location": "...", "kind": "...", "originalMessage": {"messageId": "...",
///   "receivedTime": "...", "message": "..."}}}
/// ```
#[derive(Debug, Clone)]
pub struct JsonErrorMessageFormatter {
    originator: String,
}

impl Default for JsonErrorMessageFormatter {
    fn default() -> Self {
        Self {
            originator: "pipeflow".to_string(),
        }
    }
}

impl JsonErrorMessageFormatter {
    /// Creates a formatter with a custom originator.
    #[must_use]
    pub fn new(originator: impl Into<String>) -> Self {
        Self {
            originator: originator.into(),
        }
    }
}

impl ErrorMessageFormatter for JsonErrorMessageFormatter {
    fn format(
        &self,
        location: &str,
        cause: &PipeRunError,
        input: Option<&Message>,
        message_id: Option<&str>,
        received: Option<DateTime<Utc>>,
    ) -> Message {
        let document = serde_json::json!({
            "errorMessage": {
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "originator": self.originator,
                "message": cause.to_string(),
                "location": location,
                "kind": cause.kind(),
                "originalMessage": {
                    "messageId": message_id,
                    "receivedTime": received.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
                    "message": input.and_then(original_text),
                },
            }
        });
        Message::text(document.to_string())
    }
}

/// Binary input is rendered as base64 so the document stays valid text.
fn original_text(input: &Message) -> Option<String> {
    match input.data() {
        MessageData::Binary(bytes) => Some(STANDARD.encode(bytes)),
        _ => input.as_string(),
    }
}
