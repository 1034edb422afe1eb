//! Test assertions for pipe and pipeline results.

use crate::core::{ExitState, PipeLineResult, PipeRunResult};

/// Asserts that the pipeline ended in SUCCESS.
pub fn assert_pipeline_succeeded(result: &PipeLineResult) {
    assert!(
        result.is_successful(),
        "Expected SUCCESS, got state {} with result: {}",
        result.state(),
        result.result()
    );
}

/// Asserts the state and exit code of a pipeline result.
pub fn assert_pipeline_state(result: &PipeLineResult, state: ExitState, exit_code: i32) {
    assert_eq!(
        (result.state(), result.exit_code()),
        (state, exit_code),
        "Unexpected exit, result: {}",
        result.result()
    );
}

/// Asserts the text of a pipeline result.
pub fn assert_pipeline_text(result: &PipeLineResult, expected: &str) {
    assert_eq!(
        result.result().as_string().as_deref(),
        Some(expected),
        "Unexpected pipeline result"
    );
}

/// Asserts the forward a pipe result follows.
pub fn assert_forward(result: &PipeRunResult, expected: &str) {
    assert_eq!(
        result.forward_name(),
        expected,
        "Expected forward '{}', got '{}'",
        expected,
        result.forward_name()
    );
}

/// Asserts the text of a pipe result.
pub fn assert_pipe_text(result: &PipeRunResult, expected: &str) {
    assert_eq!(
        result.result().as_string().as_deref(),
        Some(expected),
        "Unexpected pipe result"
    );
}
