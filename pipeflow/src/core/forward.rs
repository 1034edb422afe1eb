//! Named routing edges between pipes and exits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Forward taken when a pipe completes normally.
pub const SUCCESS_FORWARD: &str = "success";

/// Forward taken when a pipe fails and declares an exception route.
pub const EXCEPTION_FORWARD: &str = "exception";

/// Forward taken when a validator rejects a message.
pub const FAILURE_FORWARD: &str = "failure";

/// A named edge from a pipe to another pipe or to an exit.
///
/// The `path` is resolved when the pipeline is built; an unknown path is a
/// configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipeForward {
    name: String,
    path: String,
}

impl PipeForward {
    /// Creates a forward.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Creates a `success` forward.
    #[must_use]
    pub fn success(path: impl Into<String>) -> Self {
        Self::new(SUCCESS_FORWARD, path)
    }

    /// Creates an `exception` forward.
    #[must_use]
    pub fn exception(path: impl Into<String>) -> Self {
        Self::new(EXCEPTION_FORWARD, path)
    }

    /// Returns the forward name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the target path, a pipe name or an exit name.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for PipeForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "forward [{}] -> [{}]", self.name, self.path)
    }
}
