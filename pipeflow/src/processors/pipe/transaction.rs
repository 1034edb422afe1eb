use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::core::{Message, Outcome, PipeLineSession, PipeRunResult};
use crate::errors::PipeRunError;
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};
use crate::resources::{TimeoutGuard, TransactionDefinition, TransactionScope};
use crate::services::EngineServices;

/// Runs a pipe inside the transaction its settings ask for.
///
/// Any failure marks the transaction rollback-only. The scope is always
/// completed; a completion failure is returned only if the pipe itself
/// succeeded.
pub struct TransactionPipeProcessor {
    next: Box<dyn PipeProcessor>,
    services: Arc<EngineServices>,
}

impl TransactionPipeProcessor {
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
impl PipeProcessor for TransactionPipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        let settings = pipe.settings();
        if pipe.pipe().uses_transactional_resource() {
            TransactionScope::ensure_not_rollback_only(session)
                .map_err(|e| PipeRunError::from(e).with_pipe(pipe.name()))?;
        }

        let description = format!("pipe [{}]", pipe.name());
        let timeout = settings
            .transaction_timeout
            .or_else(|| self.services.config.default_transaction_timeout());
        let definition = TransactionDefinition::new(
            pipeline.pipe_owner(pipe.name()),
            settings.transaction_attribute,
            timeout,
        );
        let manager = self.services.transaction_manager.as_ref();

        let scope = TransactionScope::begin(manager, &definition, session)
            .await
            .map_err(|e| PipeRunError::from(e).with_pipe(pipe.name()))?;

        let guard = TimeoutGuard::new(description, definition.timeout());
        let result = guard
            .run(self.next.process_pipe(pipeline, pipe, message, session, operation))
            .await
            .map_err(|e| e.with_pipe(pipe.name()));

        if !Outcome::of_pipe(&result).is_success() {
            scope.set_rollback_only();
        }

        match scope.complete(manager, session).await {
            Ok(()) => result,
            Err(err) if result.is_ok() => Err(PipeRunError::from(err).with_pipe(pipe.name())),
            Err(err) => {
                warn!(pipe = %pipe.name(), error = %err, "could not complete transaction after failure");
                result
            }
        }
    }
}
