//! The pipe graph walk.

use tracing::{debug, warn};

use super::PipeLine;
use crate::core::{
    Message, PipeLineResult, PipeLineSession, PipeRunResult, EXIT_CODE_KEY, EXIT_STATE_KEY,
};
use crate::errors::PipeRunError;
use crate::pipes::{ForwardTarget, PipeSpec};
use crate::processors::{PipeOperation, PipeProcessor};

impl PipeLine {
    /// Walks the graph from the first pipe until an exit is reached.
    ///
    /// Every pipe runs through `processor`. The input validator and input
    /// wrapper run once before the first pipe; the output wrapper and output
    /// validator run when an exit is reached. A failing output wrapper or
    /// output validator redirects the walk once; a second failure is accepted
    /// as final.
    ///
    /// # Errors
    ///
    /// Returns the failure of a pipe that was not routed to a forward, or a
    /// `Configuration` failure when a pipe returns an undeclared forward.
    pub(crate) async fn walk(
        &self,
        processor: &dyn PipeProcessor,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeLineResult, PipeRunError> {
        let mut message = match self.transform_null_message() {
            Some(replacement) if message.is_empty() => Message::text(replacement),
            _ => message,
        };
        let mut target = ForwardTarget::Pipe(self.first_pipe_index());

        if let Some(validator) = self.input_validator() {
            let result = processor
                .process_pipe(self, validator, message, session, PipeOperation::Validate)
                .await?;
            if !result.is_successful() {
                debug!(pipeline = %self.name(), forward = %result.forward_name(), "input validation failed");
                target = resolve(validator, &result)?;
            }
            message = result.into_result();
        }

        if let (Some(wrapper), ForwardTarget::Pipe(_)) = (self.input_wrapper(), target) {
            let result = processor
                .process_pipe(self, wrapper, message, session, PipeOperation::Run)
                .await?;
            if !result.is_successful() {
                debug!(pipeline = %self.name(), forward = %result.forward_name(), "input wrapping failed");
                target = resolve(wrapper, &result)?;
            }
            message = result.into_result();
        }

        let mut output_wrapping_redirected = false;
        let mut output_validation_redirected = false;

        loop {
            match target {
                ForwardTarget::Pipe(index) => {
                    let pipe = self.pipe_at(index)?;
                    let result = processor
                        .process_pipe(self, pipe, message, session, PipeOperation::Run)
                        .await?;
                    target = resolve(pipe, &result)?;
                    message = result.into_result();
                }
                ForwardTarget::Exit(index) => {
                    let exit = self.exit(index).ok_or_else(|| {
                        PipeRunError::internal(format!("exit index [{index}] out of range"))
                    })?;

                    if !exit.skip_wrapping() {
                        if let Some(wrapper) = self.output_wrapper() {
                            let result = processor
                                .process_pipe(self, wrapper, message, session, PipeOperation::Run)
                                .await?;
                            let failed = !result.is_successful();
                            let redirect = if failed && !output_wrapping_redirected {
                                Some(resolve(wrapper, &result)?)
                            } else {
                                None
                            };
                            message = result.into_result();
                            if let Some(next) = redirect {
                                warn!(pipeline = %self.name(), "output wrapping failed, redirecting");
                                output_wrapping_redirected = true;
                                target = next;
                                continue;
                            }
                        }
                    }

                    if !exit.skip_validation() {
                        if let Some(validator) = self.output_validator() {
                            let result = processor
                                .process_pipe(self, validator, message, session, PipeOperation::Validate)
                                .await?;
                            let failed = !result.is_successful();
                            let redirect = if failed && !output_validation_redirected {
                                Some(resolve(validator, &result)?)
                            } else {
                                None
                            };
                            if failed && redirect.is_none() {
                                warn!(pipeline = %self.name(), "output validation failed again, accepting result");
                            }
                            message = result.into_result();
                            if let Some(next) = redirect {
                                warn!(pipeline = %self.name(), "output validation failed, redirecting");
                                output_validation_redirected = true;
                                target = next;
                                continue;
                            }
                        }
                    }

                    debug!(
                        pipeline = %self.name(),
                        exit = %exit.name(),
                        state = %exit.state(),
                        "pipeline reached exit"
                    );
                    session.insert(EXIT_STATE_KEY, exit.state().to_string());
                    session.insert(EXIT_CODE_KEY, exit.exit_code());
                    let result = if exit.empty_result() {
                        Message::null()
                    } else {
                        message
                    };
                    return Ok(PipeLineResult::new(result, exit.state(), exit.exit_code()));
                }
            }
        }
    }

    fn pipe_at(&self, index: usize) -> Result<&PipeSpec, PipeRunError> {
        self.pipe(index)
            .ok_or_else(|| PipeRunError::internal(format!("pipe index [{index}] out of range")))
    }
}

fn resolve(pipe: &PipeSpec, result: &PipeRunResult) -> Result<ForwardTarget, PipeRunError> {
    let forward = result.forward_name();
    pipe.target(forward).ok_or_else(|| {
        PipeRunError::configuration(
            pipe.name(),
            format!("cannot find forward or pipeline exit [{forward}]"),
        )
    })
}
