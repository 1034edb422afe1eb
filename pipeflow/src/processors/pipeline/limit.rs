use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Message, PipeLineResult, PipeLineSession};
use crate::errors::PipeRunError;
use crate::observability::MeterType;
use crate::pipeline::PipeLine;
use crate::processors::PipeLineProcessor;
use crate::services::EngineServices;

/// Bounds the number of concurrent invocations of a pipeline.
pub struct LimitingPipeLineProcessor {
    next: Box<dyn PipeLineProcessor>,
    services: Arc<EngineServices>,
}

impl LimitingPipeLineProcessor {
    /// Wraps `next`.
    #[must_use]
    pub fn new(next: Box<dyn PipeLineProcessor>, services: Arc<EngineServices>) -> Self {
        Self { next, services }
    }

    /// Chain layer constructor.
    #[must_use]
    pub fn layer(
        next: Box<dyn PipeLineProcessor>,
        services: &Arc<EngineServices>,
    ) -> Box<dyn PipeLineProcessor> {
        Box::new(Self::new(next, Arc::clone(services)))
    }
}

#[async_trait]
impl PipeLineProcessor for LimitingPipeLineProcessor {
    async fn process_pipeline(
        &self,
        pipeline: &PipeLine,
        message_id: &str,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeLineResult, PipeRunError> {
        let Some(max_threads) = pipeline.max_threads() else {
            return self.next.process_pipeline(pipeline, message_id, message, session).await;
        };

        let permit = self.services.limiters.acquire(pipeline.name(), max_threads).await?;
        self.services.statistics.record(
            pipeline.name(),
            MeterType::PipelineWaitTime,
            permit.waited().as_secs_f64() * 1000.0,
        );

        let result = self.next.process_pipeline(pipeline, message_id, message, session).await;
        drop(permit);
        result
    }
}
