//! Processor chains wrapped around pipes and pipelines.
//!
//! Every cross-cutting concern is one decorator that owns the next processor
//! of its chain. A chain is assembled once by folding the decorator layers
//! over a core processor, innermost first:
//!
//! - Pipe chain: core, exception handling, input/output, size check, limit,
//!   locker, transaction, monitoring, logging, previous pipe tracking.
//! - Pipeline chain: core (the graph walk), input/output, cache, locker,
//!   limit, transaction.

pub mod pipe;
pub mod pipeline;

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Message, PipeLineResult, PipeLineSession, PipeRunResult};
use crate::errors::PipeRunError;
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::services::EngineServices;

/// The terminal operation a pipe invocation ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeOperation {
    /// [`Pipe::run`](crate::pipes::Pipe::run).
    Run,
    /// [`Pipe::validate`](crate::pipes::Pipe::validate).
    Validate,
}

/// One layer of the pipe processor chain.
#[async_trait]
pub trait PipeProcessor: Send + Sync {
    /// Processes `message` with `pipe`.
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError>;
}

/// One layer of the pipeline processor chain.
#[async_trait]
pub trait PipeLineProcessor: Send + Sync {
    /// Processes `message` with `pipeline`.
    async fn process_pipeline(
        &self,
        pipeline: &PipeLine,
        message_id: &str,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeLineResult, PipeRunError>;
}

/// Wraps a pipe processor in one decorator.
pub type PipeProcessorLayer = fn(Box<dyn PipeProcessor>, &Arc<EngineServices>) -> Box<dyn PipeProcessor>;

/// Wraps a pipeline processor in one decorator.
pub type PipeLineProcessorLayer =
    fn(Box<dyn PipeLineProcessor>, &Arc<EngineServices>) -> Box<dyn PipeLineProcessor>;

/// Pipe decorators, innermost first.
pub const PIPE_PROCESSOR_LAYERS: [PipeProcessorLayer; 9] = [
    pipe::ExceptionHandlingPipeProcessor::layer,
    pipe::InputOutputPipeProcessor::layer,
    pipe::SizeCheckPipeProcessor::layer,
    pipe::LimitingPipeProcessor::layer,
    pipe::LockerPipeProcessor::layer,
    pipe::TransactionPipeProcessor::layer,
    pipe::MonitoringPipeProcessor::layer,
    pipe::LoggingPipeProcessor::layer,
    pipe::TrackPreviousPipeProcessor::layer,
];

/// Pipeline decorators, innermost first.
pub const PIPELINE_PROCESSOR_LAYERS: [PipeLineProcessorLayer; 5] = [
    pipeline::InputOutputPipeLineProcessor::layer,
    pipeline::CachePipeLineProcessor::layer,
    pipeline::LockerPipeLineProcessor::layer,
    pipeline::LimitingPipeLineProcessor::layer,
    pipeline::TransactionPipeLineProcessor::layer,
];

/// Assembles the pipe processor chain.
#[must_use]
pub fn build_pipe_processor_chain(services: &Arc<EngineServices>) -> Arc<dyn PipeProcessor> {
    let core: Box<dyn PipeProcessor> = Box::new(pipe::CorePipeProcessor);
    Arc::from(
        PIPE_PROCESSOR_LAYERS
            .iter()
            .fold(core, |next, layer| layer(next, services)),
    )
}

/// Assembles the pipeline processor chain around a pipe processor chain.
#[must_use]
pub fn build_pipeline_processor_chain(
    services: &Arc<EngineServices>,
    pipe_processor: Arc<dyn PipeProcessor>,
) -> Arc<dyn PipeLineProcessor> {
    let core: Box<dyn PipeLineProcessor> = Box::new(pipeline::CorePipeLineProcessor::new(pipe_processor));
    Arc::from(
        PIPELINE_PROCESSOR_LAYERS
            .iter()
            .fold(core, |next, layer| layer(next, services)),
    )
}
