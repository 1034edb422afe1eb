use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::core::{Message, PipeLineSession, PipeRunResult, EXCEPTION_FORWARD};
use crate::errors::PipeRunError;
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};
use crate::services::EngineServices;

/// Routes failures of a pipe to its `exception` forward.
///
/// The failure is rendered with the engine's error formatter and the rendered
/// message continues on the `exception` forward. Pipes without that forward,
/// pipes that generate exceptions on purpose and fatal failures propagate
/// unchanged.
pub struct ExceptionHandlingPipeProcessor {
    next: Box<dyn PipeProcessor>,
    services: Arc<EngineServices>,
}

impl ExceptionHandlingPipeProcessor {
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
impl PipeProcessor for ExceptionHandlingPipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        if !pipe.has_forward(EXCEPTION_FORWARD) || pipe.pipe().generates_exceptions() {
            return self.next.process_pipe(pipeline, pipe, message, session, operation).await;
        }

        let input = message.clone();
        match self.next.process_pipe(pipeline, pipe, message, session, operation).await {
            Err(err) if !err.is_fatal() => {
                warn!(
                    pipeline = %pipeline.name(),
                    pipe = %pipe.name(),
                    error = %err,
                    "pipe failed, following exception forward"
                );
                let message_id = session.message_id();
                let formatted = self.services.error_formatter.format(
                    &format!("pipe [{}]", pipe.name()),
                    &err,
                    Some(&input),
                    message_id.as_deref(),
                    session.received(),
                );
                Ok(PipeRunResult::with_forward(formatted, EXCEPTION_FORWARD))
            }
            other => other,
        }
    }
}
