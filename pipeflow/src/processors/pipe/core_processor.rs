use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::error;

use crate::core::{Message, PipeLineSession, PipeRunResult};
use crate::errors::{PipeRunError, PipeRunErrorKind};
use crate::pipeline::PipeLine;
use crate::pipes::PipeSpec;
use crate::processors::{PipeOperation, PipeProcessor};

/// Innermost pipe processor: invokes the pipe.
///
/// A panic inside the pipe is caught and reported as a fatal failure of that pipe.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorePipeProcessor;

#[async_trait]
impl PipeProcessor for CorePipeProcessor {
    async fn process_pipe(
        &self,
        pipeline: &PipeLine,
        pipe: &PipeSpec,
        message: Message,
        session: &mut PipeLineSession,
        operation: PipeOperation,
    ) -> Result<PipeRunResult, PipeRunError> {
        let work = async {
            match operation {
                PipeOperation::Run => pipe.pipe().run(message, session).await,
                PipeOperation::Validate => pipe.pipe().validate(message, session).await,
            }
        };

        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result.map_err(|e| e.with_pipe(pipe.name())),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(pipeline = %pipeline.name(), pipe = %pipe.name(), reason = %reason, "pipe panicked");
                Err(PipeRunError::new(PipeRunErrorKind::Panic, format!("panicked: {reason}"))
                    .with_pipe(pipe.name()))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
