use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::core::{Message, Outcome, PipeLineResult, PipeLineSession};
use crate::errors::PipeRunError;
use crate::pipeline::PipeLine;
use crate::processors::PipeLineProcessor;
use crate::resources::{TimeoutGuard, TransactionDefinition, TransactionScope};
use crate::services::EngineServices;

/// Runs the whole invocation inside the pipeline's transaction.
///
/// A failure or a result whose state is not SUCCESS marks the transaction
/// rollback-only.
pub struct TransactionPipeLineProcessor {
    next: Box<dyn PipeLineProcessor>,
    services: Arc<EngineServices>,
}

impl TransactionPipeLineProcessor {
    /// Wraps `next`.
    #[must_use]
    pub fn new(next: Box<dyn PipeLineProcessor>, services: Arc<EngineServices>) -> Self {
        Self { next, services }
    }

    /// Chain layer constructor.
    #[must_use]
    pub fn layer(
        next: Box<dyn PipeLineProcessor>,
        services: &Arc<EngineServices>,
    ) -> Box<dyn PipeLineProcessor> {
        Box::new(Self::new(next, Arc::clone(services)))
    }
}

#[async_trait]
impl PipeLineProcessor for TransactionPipeLineProcessor {
    async fn process_pipeline(
        &self,
        pipeline: &PipeLine,
        message_id: &str,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeLineResult, PipeRunError> {
        let timeout = pipeline
            .transaction_timeout()
            .or_else(|| self.services.config.default_transaction_timeout());
        let definition =
            TransactionDefinition::new(pipeline.name(), pipeline.transaction_attribute(), timeout);
        let manager = self.services.transaction_manager.as_ref();

        let scope = TransactionScope::begin(manager, &definition, session).await?;

        let guard = TimeoutGuard::new(format!("pipeline [{}]", pipeline.name()), definition.timeout());
        let result = guard
            .run(self.next.process_pipeline(pipeline, message_id, message, session))
            .await;

        if !Outcome::of_pipeline(&result).is_success() {
            scope.set_rollback_only();
        }

        match scope.complete(manager, session).await {
            Ok(()) => result,
            Err(err) if result.is_ok() => Err(err.into()),
            Err(err) => {
                warn!(pipeline = %pipeline.name(), error = %err, "could not complete transaction after failure");
                result
            }
        }
    }
}
