//! Utility functions shared by the engine.
//!
//! - Identifier generation
//! - Human-readable byte sizes
//! - Result compaction and restoration of moved elements
//! - Masking of logged payloads

pub mod compaction;
mod ids;
mod masking;
pub mod size;

pub use compaction::{restore_moved_elements, Compactor};
pub use ids::{generate_message_id, generate_token, generate_uuid};
pub use masking::{hide, hide_opt};
pub use size::{format_size, parse_size};
