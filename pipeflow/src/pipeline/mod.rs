//! Pipeline definition, building and execution.
//!
//! This module provides:
//! - The immutable [`PipeLine`] graph of pipes, forwards and exits
//! - [`PipeLineBuilder`] with validation and forward resolution
//! - The graph walk driven by the pipe processor chain
//! - [`Adapter`], the entry point that owns a pipeline and its processor chains

mod adapter;
mod builder;
mod walk;

#[cfg(test)]
mod integration_tests;

pub use adapter::{Adapter, AdapterStats, LastMessage};
pub use builder::PipeLineBuilder;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::PipeLineExit;
use crate::pipes::PipeSpec;
use crate::resources::{Cache, Locker, Propagation};

/// A configured graph of pipes.
///
/// Built once with [`PipeLineBuilder`] and shared read-only by every
/// invocation.
#[derive(Clone)]
pub struct PipeLine {
    name: String,
    pipes: Vec<PipeSpec>,
    pipe_index: HashMap<String, usize>,
    exits: Vec<PipeLineExit>,
    first_pipe: usize,
    input_validator: Option<PipeSpec>,
    output_validator: Option<PipeSpec>,
    input_wrapper: Option<PipeSpec>,
    output_wrapper: Option<PipeSpec>,
    cache: Option<Arc<dyn Cache>>,
    locker: Option<Arc<dyn Locker>>,
    max_threads: Option<usize>,
    transaction_attribute: Propagation,
    transaction_timeout: Option<Duration>,
    message_size_warn: Option<u64>,
    transform_null_message: Option<String>,
}

impl PipeLine {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PipeLineBuilder {
        PipeLineBuilder::new(name)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pipes in declaration order.
    #[must_use]
    pub fn pipes(&self) -> &[PipeSpec] {
        &self.pipes
    }

    /// Returns the pipe at `index`.
    #[must_use]
    pub fn pipe(&self, index: usize) -> Option<&PipeSpec> {
        self.pipes.get(index)
    }

    /// Returns the pipe with the given name.
    #[must_use]
    pub fn find_pipe(&self, name: &str) -> Option<&PipeSpec> {
        self.pipe_index.get(name).and_then(|&i| self.pipes.get(i))
    }

    /// Returns the exits in declaration order.
    #[must_use]
    pub fn exits(&self) -> &[PipeLineExit] {
        &self.exits
    }

    /// Returns the exit at `index`.
    #[must_use]
    pub fn exit(&self, index: usize) -> Option<&PipeLineExit> {
        self.exits.get(index)
    }

    /// Returns the exit with the given name.
    #[must_use]
    pub fn find_exit(&self, name: &str) -> Option<&PipeLineExit> {
        self.exits.iter().find(|e| e.name() == name)
    }

    /// Returns the pipe the walk starts at.
    #[must_use]
    pub fn first_pipe(&self) -> &PipeSpec {
        &self.pipes[self.first_pipe]
    }

    pub(crate) fn first_pipe_index(&self) -> usize {
        self.first_pipe
    }

    /// Returns the input validator.
    #[must_use]
    pub fn input_validator(&self) -> Option<&PipeSpec> {
        self.input_validator.as_ref()
    }

    /// Returns the output validator.
    #[must_use]
    pub fn output_validator(&self) -> Option<&PipeSpec> {
        self.output_validator.as_ref()
    }

    /// Returns the input wrapper.
    #[must_use]
    pub fn input_wrapper(&self) -> Option<&PipeSpec> {
        self.input_wrapper.as_ref()
    }

    /// Returns the output wrapper.
    #[must_use]
    pub fn output_wrapper(&self) -> Option<&PipeSpec> {
        self.output_wrapper.as_ref()
    }

    /// Returns the result cache.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    /// Returns the pipeline locker.
    #[must_use]
    pub fn locker(&self) -> Option<&Arc<dyn Locker>> {
        self.locker.as_ref()
    }

    /// Returns the maximum number of concurrent invocations.
    #[must_use]
    pub fn max_threads(&self) -> Option<usize> {
        self.max_threads
    }

    /// Returns the transaction propagation.
    #[must_use]
    pub fn transaction_attribute(&self) -> Propagation {
        self.transaction_attribute
    }

    /// Returns the transaction timeout.
    #[must_use]
    pub fn transaction_timeout(&self) -> Option<Duration> {
        self.transaction_timeout
    }

    /// Returns the message size warning threshold, overriding the engine setting.
    #[must_use]
    pub fn message_size_warn(&self) -> Option<u64> {
        self.message_size_warn
    }

    /// Returns the replacement for empty input messages.
    #[must_use]
    pub fn transform_null_message(&self) -> Option<&str> {
        self.transform_null_message.as_deref()
    }

    /// Returns the statistics and limiter owner key of a pipe.
    #[must_use]
    pub fn pipe_owner(&self, pipe: &str) -> String {
        format!("{}/{pipe}", self.name)
    }
}

impl fmt::Debug for PipeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeLine")
            .field("name", &self.name)
            .field("pipes", &self.pipes.iter().map(PipeSpec::name).collect::<Vec<_>>())
            .field("exits", &self.exits)
            .field("first_pipe", &self.first_pipe().name())
            .field("max_threads", &self.max_threads)
            .field("transaction_attribute", &self.transaction_attribute)
            .finish_non_exhaustive()
    }
}
