use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

use crate::core::{Message, PipeLineSession, PipeRunResult};
use crate::errors::PipeRunError;
use crate::observability::MeterType;
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};
use crate::services::EngineServices;

/// Bounds the number of concurrent invocations of a pipe.
///
/// The semaphore is shared by all invocations and keyed by `pipeline/pipe`.
/// Pipes without `max_threads` pass straight through.
pub struct LimitingPipeProcessor {
    next: Box<dyn PipeProcessor>,
    services: Arc<EngineServices>,
}

impl LimitingPipeProcessor {
    /// Wraps `next`.
    #[must_use]
    pub fn new(next: Box<dyn PipeProcessor>, services: Arc<EngineServices>) -> Self {
        Self { next, services }
    }

    /// Chain layer constructor.
    #[must_use]
    pub fn layer(next: Box<dyn PipeProcessor>, services: &Arc<EngineServices>) -> Box<dyn PipeProcessor> {
        Box::new(Self::new(next, Arc::clone(services)))
    }
}

#[async_trait]
impl PipeProcessor for LimitingPipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        let Some(max_threads) = pipe.settings().max_threads else {
            return self.next.process_pipe(pipeline, pipe, message, session, operation).await;
        };

        let owner = pipeline.pipe_owner(pipe.name());
        let permit = self
            .services
            .limiters
            .acquire(&owner, max_threads)
            .await
            .map_err(|e| e.with_pipe(pipe.name()))?;
        let waited_ms = permit.waited().as_secs_f64() * 1000.0;
        trace!(owner = %owner, waited_ms, "acquired pipe permit");
        self.services
            .statistics
            .record(&owner, MeterType::PipeWaitTime, waited_ms);

        let result = self.next.process_pipe(pipeline, pipe, message, session, operation).await;
        drop(permit);
        result
    }
}
