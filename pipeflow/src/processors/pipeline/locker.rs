use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{Message, PipeLineResult, PipeLineSession};
use crate::errors::{LockerError, PipeRunError};
use crate::pipeline::PipeLine;
use crate::processors::PipeLineProcessor;
use crate::resources::LockGuard;
use crate::services::EngineServices;

/// Holds the pipeline's lock for the whole invocation.
///
/// When the lock cannot be obtained the message is not processed and an empty
/// SUCCESS result is returned. An interrupted wait fails the invocation.
pub struct LockerPipeLineProcessor {
    next: Box<dyn PipeLineProcessor>,
}

impl LockerPipeLineProcessor {
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
impl PipeLineProcessor for LockerPipeLineProcessor {
    async fn process_pipeline(
        &self,
        pipeline: &PipeLine,
        message_id: &str,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeLineResult, PipeRunError> {
        let Some(locker) = pipeline.locker().cloned() else {
            return self.next.process_pipeline(pipeline, message_id, message, session).await;
        };

        let token = match locker.acquire(session).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!(pipeline = %pipeline.name(), lock = %locker.object_id(), "could not obtain lock, message not processed");
                return Ok(PipeLineResult::success(Message::null()));
            }
            Err(err @ LockerError::Interrupted { .. }) => {
                return Err(PipeRunError::interrupted(format!(
                    "interrupted while obtaining lock [{}]",
                    locker.object_id()
                ))
                .with_source(err));
            }
            Err(err) => {
                warn!(pipeline = %pipeline.name(), error = %err, "could not obtain lock, message not processed");
                return Ok(PipeLineResult::success(Message::null()));
            }
        };

        let guard = LockGuard::new(locker, token);
        let result = self.next.process_pipeline(pipeline, message_id, message, session).await;

        if let Err(err) = guard.release().await {
            warn!(pipeline = %pipeline.name(), error = %err, "could not release lock");
        }
        result
    }
}
