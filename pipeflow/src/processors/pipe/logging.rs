use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, Level};

use crate::core::{Message, PipeLineSession, PipeRunResult};
use crate::errors::PipeRunError;
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};
use crate::services::EngineServices;
use crate::utils::hide_opt;

/// Logs every pipe call, and optionally the message passed to it.
pub struct LoggingPipeProcessor {
    next: Box<dyn PipeProcessor>,
    services: Arc<EngineServices>,
}

impl LoggingPipeProcessor {
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
impl PipeProcessor for LoggingPipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        let message_id = session.message_id().unwrap_or_default();
        let log_message = pipe
            .settings()
            .log_intermediary_results
            .unwrap_or(self.services.config.log_intermediary_results);

        if tracing::enabled!(Level::DEBUG) {
            debug!(pipeline = %pipeline.name(), mid = %message_id, pipe = %pipe.name(), ?operation, "calling pipe");
        } else {
            info!(pipeline = %pipeline.name(), mid = %message_id, pipe = %pipe.name(), "pipeline process is about to call pipe");
        }
        if log_message {
            let text = hide_opt(&message.to_string(), pipe.hide_pattern());
            info!(pipeline = %pipeline.name(), pipe = %pipe.name(), message = %text, "message passed to pipe");
        }

        self.next.process_pipe(pipeline, pipe, message, session, operation).await
    }
}
