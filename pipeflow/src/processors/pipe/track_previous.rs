use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Message, PipeLineSession, PipeRunResult};
use crate::errors::PipeRunError;
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};
use crate::services::EngineServices;

/// Message context key holding the name of the pipe that produced the message.
pub const PREVIOUS_PIPE_KEY: &str = "previousPipe";

/// Stamps the name of the executed pipe into the result's context.
pub struct TrackPreviousPipeProcessor {
    next: Box<dyn PipeProcessor>,
}

impl TrackPreviousPipeProcessor {
    /// Wraps `next`.
    #[must_use]
    pub fn new(next: Box<dyn PipeProcessor>) -> Self {
        Self { next }
    }

    /// Chain layer constructor.
    #[must_use]
    pub fn layer(next: Box<dyn PipeProcessor>, _services: &Arc<EngineServices>) -> Box<dyn PipeProcessor> {
        Box::new(Self::new(next))
    }
}

#[async_trait]
impl PipeProcessor for TrackPreviousPipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        let mut result = self.next.process_pipe(pipeline, pipe, message, session, operation).await?;
        result
            .result_mut()
            .context_mut()
            .insert(PREVIOUS_PIPE_KEY.to_string(), serde_json::json!(pipe.name()));
        Ok(result)
    }
}
