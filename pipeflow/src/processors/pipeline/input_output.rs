use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info_span, Instrument};

use crate::core::{
    Message, PipeLineResult, PipeLineSession, CORRELATION_ID_KEY, MESSAGE_ID_KEY,
    ORIGINAL_MESSAGE_KEY, TS_RECEIVED_KEY,
};
use crate::errors::PipeRunError;
use crate::pipeline::PipeLine;
use crate::processors::PipeLineProcessor;
use crate::services::EngineServices;

/// Initializes the session of an invocation and binds its message id to the
/// trace context and a `tracing` span.
pub struct InputOutputPipeLineProcessor {
    next: Box<dyn PipeLineProcessor>,
}

impl InputOutputPipeLineProcessor {
    /// Wraps `next`.
    #[must_use]
    pub fn new(next: Box<dyn PipeLineProcessor>) -> Self {
        Self { next }
    }

    /// Chain layer constructor.
    #[must_use]
    pub fn layer(
        next: Box<dyn PipeLineProcessor>,
        _services: &Arc<EngineServices>,
    ) -> Box<dyn PipeLineProcessor> {
        Box::new(Self::new(next))
    }
}

#[async_trait]
impl PipeLineProcessor for InputOutputPipeLineProcessor {
    async fn process_pipeline(
        &self,
        pipeline: &PipeLine,
        message_id: &str,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeLineResult, PipeRunError> {
        session.insert(MESSAGE_ID_KEY, message_id);
        if !session.contains_key(CORRELATION_ID_KEY) {
            session.insert(CORRELATION_ID_KEY, message_id);
        }
        if !session.contains_key(TS_RECEIVED_KEY) {
            session.insert(TS_RECEIVED_KEY, Utc::now());
        }
        session.insert(ORIGINAL_MESSAGE_KEY, message.clone());

        let _scope = session.trace().scoped(MESSAGE_ID_KEY, message_id);
        let span = info_span!("pipeline", pipeline = %pipeline.name(), mid = %message_id);
        self.next
            .process_pipeline(pipeline, message_id, message, session)
            .instrument(span)
            .await
    }
}
