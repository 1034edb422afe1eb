use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Message, PipeLineResult, PipeLineSession};
use crate::errors::PipeRunError;
use crate::pipeline::PipeLine;
use crate::processors::{PipeLineProcessor, PipeProcessor};

/// Innermost pipeline processor: walks the pipe graph.
pub struct CorePipeLineProcessor {
    pipe_processor: Arc<dyn PipeProcessor>,
}

impl CorePipeLineProcessor {
    /// Creates a core processor that runs every pipe through `pipe_processor`.
    #[must_use]
    pub fn new(pipe_processor: Arc<dyn PipeProcessor>) -> Self {
        Self { pipe_processor }
    }
}

#[async_trait]
impl PipeLineProcessor for CorePipeLineProcessor {
    async fn process_pipeline(
        &self,
        pipeline: &PipeLine,
        _message_id: &str,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeLineResult, PipeRunError> {
        pipeline.walk(self.pipe_processor.as_ref(), message, session).await
    }
}
