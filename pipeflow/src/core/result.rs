//! Results of pipe and pipeline invocations.

use super::exit::ExitState;
use super::forward::{EXCEPTION_FORWARD, SUCCESS_FORWARD};
use super::message::Message;
use crate::errors::PipeRunError;

/// The outcome of running a single pipe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipeRunResult {
    result: Message,
    forward: Option<String>,
}

impl PipeRunResult {
    /// Creates a result that follows the pipe's `success` forward.
    #[must_use]
    pub fn new(result: impl Into<Message>) -> Self {
        Self {
            result: result.into(),
            forward: None,
        }
    }

    /// Creates a result routed to the named forward.
    #[must_use]
    pub fn with_forward(result: impl Into<Message>, forward: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            forward: Some(forward.into()),
        }
    }

    /// Returns the resulting message.
    #[must_use]
    pub fn result(&self) -> &Message {
        &self.result
    }

    /// Consumes the result and returns the message.
    #[must_use]
    pub fn into_result(self) -> Message {
        self.result
    }

    /// Returns the resulting message for modification.
    pub fn result_mut(&mut self) -> &mut Message {
        &mut self.result
    }

    /// Replaces the resulting message.
    pub fn set_result(&mut self, result: Message) {
        self.result = result;
    }

    /// Returns the explicit forward, if any.
    #[must_use]
    pub fn forward(&self) -> Option<&str> {
        self.forward.as_deref()
    }

    /// Returns the forward to follow, defaulting to `success`.
    #[must_use]
    pub fn forward_name(&self) -> &str {
        self.forward.as_deref().unwrap_or(SUCCESS_FORWARD)
    }

    /// Returns true if the result follows the `success` forward.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.forward_name() == SUCCESS_FORWARD
    }
}

/// The outcome of a pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeLineResult {
    result: Message,
    state: ExitState,
    exit_code: i32,
}

impl PipeLineResult {
    /// Creates a result.
    #[must_use]
    pub fn new(result: impl Into<Message>, state: ExitState, exit_code: i32) -> Self {
        Self {
            result: result.into(),
            state,
            exit_code,
        }
    }

    /// Creates a SUCCESS result with exit code 0.
    #[must_use]
    pub fn success(result: impl Into<Message>) -> Self {
        Self::new(result, ExitState::Success, 0)
    }

    /// Creates an ERROR result with exit code 0.
    #[must_use]
    pub fn error(result: impl Into<Message>) -> Self {
        Self::new(result, ExitState::Error, 0)
    }

    /// Returns the resulting message.
    #[must_use]
    pub fn result(&self) -> &Message {
        &self.result
    }

    /// Consumes the result and returns the message.
    #[must_use]
    pub fn into_result(self) -> Message {
        self.result
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

    /// Returns true if the state is SUCCESS.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.state.is_success()
    }
}

/// Classification of a processed call, used by the transaction decorators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call completed normally.
    Success,
    /// The call failed in a way that concerns only this message.
    RecoverableFailure,
    /// The call failed because the engine or graph is broken.
    FatalFailure,
}

impl Outcome {
    /// Classifies a pipe invocation. A failure already routed to the
    /// `exception` forward is still a recoverable failure.
    #[must_use]
    pub fn of_pipe(result: &Result<PipeRunResult, PipeRunError>) -> Self {
        match result {
            Ok(r) if r.forward_name() == EXCEPTION_FORWARD => Self::RecoverableFailure,
            Ok(_) => Self::Success,
            Err(err) => Self::of_error(err),
        }
    }

    /// Classifies a pipeline invocation. A non-SUCCESS state is a recoverable failure.
    #[must_use]
    pub fn of_pipeline(result: &Result<PipeLineResult, PipeRunError>) -> Self {
        match result {
            Ok(r) if r.is_successful() => Self::Success,
            Ok(_) => Self::RecoverableFailure,
            Err(err) => Self::of_error(err),
        }
    }

    fn of_error(err: &PipeRunError) -> Self {
        if err.is_fatal() {
            Self::FatalFailure
        } else {
            Self::RecoverableFailure
        }
    }

    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}
