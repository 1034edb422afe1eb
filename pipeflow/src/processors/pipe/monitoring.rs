use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::core::{Message, PipeLineSession, PipeRunResult};
use crate::errors::{PipeRunError, PipeRunErrorKind};
use crate::events::MonitorEvent;
use crate::observability::{MeterType, SpanTimer};
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};
use crate::services::EngineServices;

/// Records pipe durations and raises exception and long-duration events.
pub struct MonitoringPipeProcessor {
    next: Box<dyn PipeProcessor>,
    services: Arc<EngineServices>,
}

impl MonitoringPipeProcessor {
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
impl PipeProcessor for MonitoringPipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        let owner = pipeline.pipe_owner(pipe.name());
        let timer = SpanTimer::start(&owner);

        let result = self
            .next
            .process_pipe(pipeline, pipe, message, session, operation)
            .await
            .map_err(|err| {
                let err = if err.kind() == PipeRunErrorKind::Internal {
                    err.with_kind(PipeRunErrorKind::Execution)
                } else {
                    err
                };
                err.with_pipe(pipe.name())
            });

        let elapsed = timer.elapsed();
        self.services
            .statistics
            .record(&owner, MeterType::PipeDuration, timer.finish());

        if let Err(err) = &result {
            MonitorEvent::PipeException.fire(
                self.services.events.as_ref(),
                pipeline.name(),
                pipe.name(),
                serde_json::json!({
                    "kind": err.kind(),
                    "message": err.to_string(),
                }),
            );
        }

        if let Some(threshold) = pipe.settings().duration_threshold {
            if elapsed > threshold {
                warn!(
                    pipeline = %pipeline.name(),
                    pipe = %pipe.name(),
                    duration_ms = elapsed.as_millis(),
                    threshold_ms = threshold.as_millis(),
                    "pipe exceeded duration threshold"
                );
                MonitorEvent::PipeLongDuration.fire(
                    self.services.events.as_ref(),
                    pipeline.name(),
                    pipe.name(),
                    serde_json::json!({
                        "duration_ms": elapsed.as_millis(),
                        "threshold_ms": threshold.as_millis(),
                    }),
                );
            }
        }
        result
    }
}
