use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{Message, PipeLineResult, PipeLineSession};
use crate::errors::PipeRunError;
use crate::pipeline::PipeLine;
use crate::processors::PipeLineProcessor;
use crate::resources::CacheEntry;
use crate::services::EngineServices;

/// Serves results from the pipeline's cache.
///
/// On a hit the walk is skipped. On a miss the walk runs and its transformed
/// result is stored together with the exit state and code. Concurrent misses
/// for the same key may both run the walk. Cache failures are logged and
/// treated as misses.
pub struct CachePipeLineProcessor {
    next: Box<dyn PipeLineProcessor>,
}

impl CachePipeLineProcessor {
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
impl PipeLineProcessor for CachePipeLineProcessor {
    async fn process_pipeline(
        &self,
        pipeline: &PipeLine,
        message_id: &str,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeLineResult, PipeRunError> {
        let Some(cache) = pipeline.cache() else {
            return self.next.process_pipeline(pipeline, message_id, message, session).await;
        };
        let Some(key) = cache.transform_key(&message, session) else {
            debug!(cache = %cache.name(), "no cache key, bypassing cache");
            return self.next.process_pipeline(pipeline, message_id, message, session).await;
        };

        match cache.get(&key).await {
            Ok(Some(entry)) => {
                debug!(cache = %cache.name(), key = %key, "cache hit");
                return Ok(PipeLineResult::new(entry.value, entry.state, entry.exit_code));
            }
            Ok(None) => debug!(cache = %cache.name(), key = %key, "cache miss"),
            Err(err) => warn!(cache = %cache.name(), error = %err, "cache lookup failed"),
        }

        let result = self
            .next
            .process_pipeline(pipeline, message_id, message, session)
            .await?;

        if let Some(value) = cache.transform_value(result.result(), session) {
            let entry = CacheEntry::new(value, result.state(), result.exit_code());
            if let Err(err) = cache.put(&key, entry).await {
                warn!(cache = %cache.name(), error = %err, "could not store result in cache");
            }
        }
        Ok(result)
    }
}
