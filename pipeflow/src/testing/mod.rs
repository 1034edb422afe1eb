//! Testing utilities for pipeflow pipelines.
//!
//! This module provides:
//! - Mock pipes
//! - Recording collaborators and an engine fixture
//! - Assertions for pipe and pipeline results

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_forward, assert_pipe_text, assert_pipeline_state, assert_pipeline_succeeded,
    assert_pipeline_text,
};
pub use fixtures::{
    FailingLocker, RecordingTransactionManager, TestFixture, TransactionEvent, TransactionRecord,
};
pub use mocks::{
    BlockingPipe, CountingPipe, EchoPipe, FailingPipe, FixedPipe, PanickingPipe,
    SessionWritingPipe,
};
