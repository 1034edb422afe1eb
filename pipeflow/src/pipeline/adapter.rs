//! The entry point that owns a pipeline and its processor chains.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use super::PipeLine;
use crate::core::{ExitState, Message, PipeLineResult, PipeLineSession, TS_RECEIVED_KEY};
use crate::observability::{MeterType, SpanTimer};
use crate::processors::{
    build_pipe_processor_chain, build_pipeline_processor_chain, PipeLineProcessor,
};
use crate::services::EngineServices;
use crate::utils::generate_message_id;

/// Counters kept by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStats {
    /// Messages processed, successful or not.
    pub processed: u64,
    /// Messages that ended in a failure or a non-SUCCESS state.
    pub errors: u64,
    /// The last message received.
    pub last_message: Option<LastMessage>,
}

/// The id and receipt time of the last message an adapter received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastMessage {
    /// Message id.
    pub message_id: String,
    /// When it was received.
    pub received: DateTime<Utc>,
}

/// Owns one pipeline and the two processor chains that run it.
///
/// Failures that escape the pipeline are logged, counted and turned into an
/// ERROR result carrying the formatted error message.
pub struct Adapter {
    pipeline: Arc<PipeLine>,
    processor: Arc<dyn PipeLineProcessor>,
    services: Arc<EngineServices>,
    processed: AtomicU64,
    errors: AtomicU64,
    last_message: Mutex<Option<LastMessage>>,
}

impl Adapter {
    /// Creates an adapter and assembles its processor chains.
    #[must_use]
    pub fn new(pipeline: PipeLine, services: Arc<EngineServices>) -> Self {
        let pipe_processor = build_pipe_processor_chain(&services);
        let processor = build_pipeline_processor_chain(&services, pipe_processor);
        info!(adapter = %pipeline.name(), pipes = pipeline.pipes().len(), "adapter configured");
        Self {
            pipeline: Arc::new(pipeline),
            processor,
            services,
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_message: Mutex::new(None),
        }
    }

    /// Returns the adapter name, which is the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.pipeline.name()
    }

    /// Returns the pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &PipeLine {
        &self.pipeline
    }

    /// Returns the engine services.
    #[must_use]
    pub fn services(&self) -> &Arc<EngineServices> {
        &self.services
    }

    /// Returns the counters.
    #[must_use]
    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_message: self.last_message.lock().clone(),
        }
    }

    /// Processes a message in a fresh session with a generated message id.
    pub async fn process(&self, message: impl Into<Message>) -> PipeLineResult {
        let mut session = PipeLineSession::new();
        self.process_message(None, message.into(), &mut session).await
    }

    /// Processes a message in the caller's session.
    ///
    /// The message id is taken from `message_id`, then from the session, and
    /// generated otherwise. The session is closed when processing ends.
    pub async fn process_message(
        &self,
        message_id: Option<String>,
        message: Message,
        session: &mut PipeLineSession,
    ) -> PipeLineResult {
        let message_id = message_id
            .or_else(|| session.message_id())
            .unwrap_or_else(generate_message_id);
        let received = session.received().unwrap_or_else(Utc::now);
        if !session.contains_key(TS_RECEIVED_KEY) {
            session.insert(TS_RECEIVED_KEY, received);
        }
        *self.last_message.lock() = Some(LastMessage {
            message_id: message_id.clone(),
            received,
        });

        if let Some(size) = message.size() {
            self.services
                .statistics
                .record(self.name(), MeterType::PipelineRequestSize, size as f64);
        }

        let timer = SpanTimer::start(self.name());
        let outcome = self
            .processor
            .process_pipeline(&self.pipeline, &message_id, message, session)
            .await;
        self.services
            .statistics
            .record(self.name(), MeterType::PipelineDuration, timer.finish());
        self.processed.fetch_add(1, Ordering::Relaxed);

        let result = match outcome {
            Ok(result) => {
                if !result.is_successful() {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                }
                result
            }
            Err(err) => {
                error!(adapter = %self.name(), mid = %message_id, error = %err, "error processing message");
                self.errors.fetch_add(1, Ordering::Relaxed);
                let original = session.original_message();
                let formatted = self.services.error_formatter.format(
                    &format!("adapter [{}]", self.name()),
                    &err,
                    original.as_ref(),
                    Some(&message_id),
                    session.received(),
                );
                PipeLineResult::new(formatted, ExitState::Error, 0)
            }
        };

        session.close();
        result
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("pipeline", &self.pipeline)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
