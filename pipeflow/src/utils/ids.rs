//! Identifier generation.

use uuid::Uuid;

/// Generates a new random UUID.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a message id for a message that arrived without one.
///
/// Ids are time-ordered so that log lines of consecutive messages sort
/// naturally.
#[must_use]
pub fn generate_message_id() -> String {
    format!("pf-{}", Uuid::now_v7())
}

/// Generates an opaque token, used for lock ownership.
#[must_use]
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}
