use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{Message, MessageData, PipeLineSession, PipeRunResult, SUCCESS_FORWARD};
use crate::errors::PipeRunError;
use crate::observability::SECURITY_TARGET;
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};
use crate::services::EngineServices;
use crate::utils::{hide_opt, restore_moved_elements};

/// Substitutes the input of a pipe and post-processes its result.
///
/// Before the pipe runs the input is taken from a fixed value, a session key
/// or the current message, and empty input may be replaced. When a skip
/// condition holds the pipe is bypassed and the input continues on the
/// `success` forward. After the pipe runs the result may have moved elements
/// restored or be compacted, may be stored in the session, and may be replaced
/// by the original input.
pub struct InputOutputPipeProcessor {
    next: Box<dyn PipeProcessor>,
}

impl InputOutputPipeProcessor {
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

    fn resolve_input(
        pipe: &PipeSpec,
        message: Message,
        session: &PipeLineSession,
    ) -> Result<Message, PipeRunError> {
        let settings = pipe.settings();
        let mut input = if let Some(fixed) = &settings.get_input_from_fixed_value {
            Message::text(fixed.clone())
        } else if let Some(key) = &settings.get_input_from_session_key {
            session.get_message(key).ok_or_else(|| {
                PipeRunError::execution(
                    pipe.name(),
                    format!("getInputFromSessionKey [{key}] is not present in session"),
                )
            })?
        } else {
            message
        };

        if input.is_empty() {
            if let Some(replacement) = &settings.empty_input_replacement {
                debug!(pipe = %pipe.name(), "replacing empty input");
                input = Message::text(replacement.clone());
            }
        }
        Ok(input)
    }

    fn write_security_log(pipeline: &PipeLine, pipe: &PipeSpec, session: &PipeLineSession) {
        let keys = pipe
            .settings()
            .sec_log_session_keys
            .iter()
            .map(|key| {
                let value = session.get_string(key).unwrap_or_default();
                format!("{key}=[{}]", hide_opt(&value, pipe.hide_pattern()))
            })
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            target: SECURITY_TARGET,
            adapter = %pipeline.name(),
            pipe = %pipe.name(),
            mid = %session.message_id().unwrap_or_default(),
            session_keys = %keys,
            "pipe executed"
        );
    }
}

#[async_trait]
impl PipeProcessor for InputOutputPipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        let settings = pipe.settings();
        let preserved = settings.preserve_input.then(|| message.clone());
        let input = Self::resolve_input(pipe, message, session)?;

        if settings.skip_pipe(&input, session) || pipe.pipe().skip_pipe(&input, session) {
            debug!(pipeline = %pipeline.name(), pipe = %pipe.name(), "skipping pipe");
            return Ok(PipeRunResult::with_forward(input, SUCCESS_FORWARD));
        }

        let mut result = self.next.process_pipe(pipeline, pipe, input, session, operation).await?;

        if settings.restore_moved_elements {
            if let Some(text) = result.result().as_text().map(|t| t.into_owned()) {
                let restored = restore_moved_elements(&text, session);
                let message = result.result().clone().with_data(MessageData::Text(restored));
                result.set_result(message);
            }
        } else if pipe.compactor().is_active() {
            if let Some(text) = result.result().as_text().map(|t| t.into_owned()) {
                let compacted = pipe.compactor().compact(&text, session);
                let message = result.result().clone().with_data(MessageData::Text(compacted));
                result.set_result(message);
            }
        }

        if let Some(key) = &settings.store_result_in_session_key {
            debug!(pipe = %pipe.name(), key = %key, "storing result in session");
            session.insert(key.clone(), result.result().clone());
        }

        if let Some(original) = preserved {
            result.set_result(original);
        }

        if settings.write_to_sec_log {
            Self::write_security_log(pipeline, pipe, session);
        }

        Ok(result)
    }
}
