//! Pipeline exits and their terminal states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the exit created when a pipeline declares none.
pub const DEFAULT_EXIT_NAME: &str = "READY";

/// The terminal state of a pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitState {
    /// The message was processed successfully.
    #[default]
    Success,
    /// Processing failed.
    Error,
    /// The message was refused.
    Rejected,
}

impl ExitState {
    /// Returns true for [`ExitState::Success`].
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Error => write!(f, "ERROR"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl FromStr for ExitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(Self::Success),
            "ERROR" => Ok(Self::Error),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(format!("unknown exit state [{other}]")),
        }
    }
}

/// A terminal node of the pipe graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeLineExit {
    name: String,
    state: ExitState,
    exit_code: i32,
    skip_wrapping: bool,
    skip_validation: bool,
    empty_result: bool,
}

impl PipeLineExit {
    /// Creates an exit with the given name and state.
    #[must_use]
    pub fn new(name: impl Into<String>, state: ExitState) -> Self {
        Self {
            name: name.into(),
            state,
            exit_code: 0,
            skip_wrapping: false,
            skip_validation: false,
            empty_result: false,
        }
    }

    /// Creates a SUCCESS exit.
    #[must_use]
    pub fn success(name: impl Into<String>) -> Self {
        Self::new(name, ExitState::Success)
    }

    /// Creates an ERROR exit.
    #[must_use]
    pub fn error(name: impl Into<String>) -> Self {
        Self::new(name, ExitState::Error)
    }

    /// Creates a REJECTED exit.
    #[must_use]
    pub fn rejected(name: impl Into<String>) -> Self {
        Self::new(name, ExitState::Rejected)
    }

    /// Sets the exit code reported to the caller.
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Skips the output wrapper when this exit is reached.
    #[must_use]
    pub fn with_skip_wrapping(mut self, skip: bool) -> Self {
        self.skip_wrapping = skip;
        self
    }

    /// Skips the output validator when this exit is reached.
    #[must_use]
    pub fn with_skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    /// Discards the message when this exit is reached.
    #[must_use]
    pub fn with_empty_result(mut self, empty: bool) -> Self {
        self.empty_result = empty;
        self
    }

    /// Returns the exit name, which is also its path.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the terminal state.
    #[must_use]
    pub fn state(&self) -> ExitState {
        self.state
    }

    /// Returns the exit code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns true if the output wrapper is skipped.
    #[must_use]
    pub fn skip_wrapping(&self) -> bool {
        self.skip_wrapping
    }

    /// Returns true if the output validator is skipped.
    #[must_use]
    pub fn skip_validation(&self) -> bool {
        self.skip_validation
    }

    /// Returns true if the result is discarded.
    #[must_use]
    pub fn empty_result(&self) -> bool {
        self.empty_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_state_display() {
        assert_eq!(ExitState::Success.to_string(), "SUCCESS");
        assert_eq!(ExitState::Error.to_string(), "ERROR");
        assert_eq!(ExitState::Rejected.to_string(), "REJECTED");
    }

    #[test]
    fn test_exit_state_parse() {
        assert_eq!("success".parse::<ExitState>(), Ok(ExitState::Success));
        assert_eq!("REJECTED".parse::<ExitState>(), Ok(ExitState::Rejected));
        assert!("done".parse::<ExitState>().is_err());
    }

    #[test]
    fn test_exit_state_serialize() {
        let json = serde_json::to_string(&ExitState::Error).unwrap();
        assert_eq!(json, r#""ERROR""#);
    }

    #[test]
    fn test_exit_builder() {
        let exit = PipeLineExit::error("Oops")
            .with_exit_code(500)
            .with_skip_wrapping(true)
            .with_empty_result(true);

        assert_eq!(exit.name(), "Oops");
        assert_eq!(exit.state(), ExitState::Error);
        assert_eq!(exit.exit_code(), 500);
        assert!(exit.skip_wrapping());
        assert!(!exit.skip_validation());
        assert!(exit.empty_result());
    }
}
