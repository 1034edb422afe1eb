use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::core::{Message, PipeLineSession, PipeRunResult};
use crate::errors::PipeRunError;
use crate::events::MonitorEvent;
use crate::observability::{MeterType, StatisticsSink};
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};
use crate::services::EngineServices;
use crate::utils::format_size;

/// Records message sizes and warns about oversized messages. Never fails.
pub struct SizeCheckPipeProcessor {
    next: Box<dyn PipeProcessor>,
    services: Arc<EngineServices>,
}

impl SizeCheckPipeProcessor {
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

    fn check(&self, pipeline: &PipeLine, pipe: &PipeSpec, direction: &str, size: u64) {
        let threshold = pipeline
            .message_size_warn()
            .unwrap_or(self.services.config.message_size_warn);
        if threshold == 0 || size <= threshold {
            return;
        }
        warn!(
            pipeline = %pipeline.name(),
            pipe = %pipe.name(),
            size = %format_size(size),
            threshold = %format_size(threshold),
            "{direction} message size exceeds threshold"
        );
        MonitorEvent::PipeMessageSizeExceeding.fire(
            self.services.events.as_ref(),
            pipeline.name(),
            pipe.name(),
            serde_json::json!({
                "direction": direction,
                "size": size,
                "threshold": threshold,
            }),
        );
    }
}

#[async_trait]
impl PipeProcessor for SizeCheckPipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        let record = pipe.settings().size_statistics || self.services.config.size_statistics;
        let owner = pipeline.pipe_owner(pipe.name());
        let statistics: &dyn StatisticsSink = self.services.statistics.as_ref();

        if let Some(size) = message.size() {
            let size = size as u64;
            self.check(pipeline, pipe, "input", size);
            if record {
                statistics.record(&owner, MeterType::PipeSizeIn, size as f64);
            }
        }

        let result = self.next.process_pipe(pipeline, pipe, message, session, operation).await?;

        if let Some(size) = result.result().size() {
            let size = size as u64;
            self.check(pipeline, pipe, "output", size);
            if record {
                statistics.record(&owner, MeterType::PipeSizeOut, size as f64);
            }
        }
        Ok(result)
    }
}
