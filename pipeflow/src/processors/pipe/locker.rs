use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{Message, PipeLineSession, PipeRunResult};
use crate::errors::{LockerError, PipeRunError, PipeRunErrorKind};
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};
use crate::resources::LockGuard;
use crate::services::EngineServices;

/// Holds the pipe's lock while it runs.
///
/// Failing to obtain the lock fails the pipe. Release problems are only logged.
pub struct LockerPipeProcessor {
    next: Box<dyn PipeProcessor>,
}

impl LockerPipeProcessor {
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
impl PipeProcessor for LockerPipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        let Some(locker) = pipe.settings().locker.clone() else {
            return self.next.process_pipe(pipeline, pipe, message, session, operation).await;
        };

        let token = match locker.acquire(session).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                return Err(PipeRunError::new(
                    PipeRunErrorKind::LockNotAcquired,
                    format!("could not obtain lock [{}]", locker.object_id()),
                )
                .with_pipe(pipe.name()));
            }
            Err(err) => {
                let kind = match err {
                    LockerError::Interrupted { .. } => PipeRunErrorKind::Interrupted,
                    LockerError::NotHeld { .. } | LockerError::Backend { .. } => {
                        PipeRunErrorKind::LockNotAcquired
                    }
                };
                return Err(PipeRunError::new(
                    kind,
                    format!("could not obtain lock [{}]", locker.object_id()),
                )
                .with_pipe(pipe.name())
                .with_source(err));
            }
        };
        let guard = LockGuard::new(locker, token);
        debug!(pipe = %pipe.name(), lock = %guard.object_id(), "obtained lock");

        let result = self.next.process_pipe(pipeline, pipe, message, session, operation).await;

        if let Err(err) = guard.release().await {
            warn!(pipe = %pipe.name(), error = %err, "could not release lock");
        }
        result
    }
}
