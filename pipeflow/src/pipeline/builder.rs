//! Pipeline builder with validation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::PipeLine;
use crate::core::{ExitState, PipeForward, PipeLineExit, DEFAULT_EXIT_NAME, SUCCESS_FORWARD};
use crate::errors::ConfigurationError;
use crate::pipes::{ForwardTarget, PipeSpec};
use crate::resources::{Cache, Locker, Propagation};

/// Builder for creating validated pipelines.
///
/// `build()` checks the whole graph and reports every problem it finds in
/// one [`ConfigurationError`].
#[derive(Debug, Clone)]
pub struct PipeLineBuilder {
    name: String,
    pipes: Vec<PipeSpec>,
    exits: Vec<PipeLineExit>,
    first_pipe: Option<String>,
    global_forwards: Vec<PipeForward>,
    input_validator: Option<PipeSpec>,
    output_validator: Option<PipeSpec>,
    input_wrapper: Option<PipeSpec>,
    output_wrapper: Option<PipeSpec>,
    cache: Option<Arc<dyn Cache>>,
    locker: Option<Arc<dyn Locker>>,
    max_threads: Option<usize>,
    transaction_attribute: Propagation,
    transaction_timeout: Option<Duration>,
    message_size_warn: Option<u64>,
    transform_null_message: Option<String>,
}

impl PipeLineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pipes: Vec::new(),
            exits: Vec::new(),
            first_pipe: None,
            global_forwards: Vec::new(),
            input_validator: None,
            output_validator: None,
            input_wrapper: None,
            output_wrapper: None,
            cache: None,
            locker: None,
            max_threads: None,
            transaction_attribute: Propagation::Supports,
            transaction_timeout: None,
            message_size_warn: None,
            transform_null_message: None,
        }
    }

    /// Adds a pipe.
    #[must_use]
    pub fn with_pipe(mut self, pipe: PipeSpec) -> Self {
        self.pipes.push(pipe);
        self
    }

    /// Adds an exit.
    #[must_use]
    pub fn with_exit(mut self, exit: PipeLineExit) -> Self {
        self.exits.push(exit);
        self
    }

    /// Sets the pipe the walk starts at. Defaults to the first added pipe.
    #[must_use]
    pub fn with_first_pipe(mut self, name: impl Into<String>) -> Self {
        self.first_pipe = Some(name.into());
        self
    }

    /// Adds a forward to every pipe that does not declare a forward of that name.
    #[must_use]
    pub fn with_global_forward(mut self, forward: PipeForward) -> Self {
        self.global_forwards.retain(|f| f.name() != forward.name());
        self.global_forwards.push(forward);
        self
    }

    /// Validates the input before the first pipe runs.
    #[must_use]
    pub fn with_input_validator(mut self, validator: PipeSpec) -> Self {
        self.input_validator = Some(validator);
        self
    }

    /// Validates the result when an exit is reached.
    #[must_use]
    pub fn with_output_validator(mut self, validator: PipeSpec) -> Self {
        self.output_validator = Some(validator);
        self
    }

    /// Unwraps the input before the first pipe runs.
    #[must_use]
    pub fn with_input_wrapper(mut self, wrapper: PipeSpec) -> Self {
        self.input_wrapper = Some(wrapper);
        self
    }

    /// Wraps the result when an exit is reached.
    #[must_use]
    pub fn with_output_wrapper(mut self, wrapper: PipeSpec) -> Self {
        self.output_wrapper = Some(wrapper);
        self
    }

    /// Caches results.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Holds a lock for the whole invocation.
    #[must_use]
    pub fn with_locker(mut self, locker: Arc<dyn Locker>) -> Self {
        self.locker = Some(locker);
        self
    }

    /// Limits concurrent invocations.
    #[must_use]
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads);
        self
    }

    /// Demarcates a transaction around the whole invocation.
    #[must_use]
    pub fn with_transaction(mut self, propagation: Propagation, timeout: Option<Duration>) -> Self {
        self.transaction_attribute = propagation;
        self.transaction_timeout = timeout;
        self
    }

    /// Overrides the engine's message size warning threshold.
    #[must_use]
    pub fn with_message_size_warn(mut self, bytes: u64) -> Self {
        self.message_size_warn = Some(bytes);
        self
    }

    /// Replaces empty input messages with `value`.
    #[must_use]
    pub fn with_transform_null_message(mut self, value: impl Into<String>) -> Self {
        self.transform_null_message = Some(value.into());
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of pipes.
    #[must_use]
    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns every wiring problem found: no pipes, duplicate or invalid
    /// names, an unknown first pipe, unresolvable forwards, invalid limits and
    /// failures of the pipes' own checks.
    pub fn build(self) -> Result<PipeLine, ConfigurationError> {
        let component = format!("pipeline [{}]", self.name);
        if self.pipes.is_empty() {
            return Err(ConfigurationError::new("pipeline has no pipes").with_component(component));
        }

        let mut problems: Option<ConfigurationError> = None;
        let mut report = |err: ConfigurationError| {
            problems = Some(ConfigurationError::suppress(problems.take(), err));
        };

        let Self {
            name,
            mut pipes,
            mut exits,
            first_pipe,
            global_forwards,
            mut input_validator,
            mut output_validator,
            mut input_wrapper,
            mut output_wrapper,
            cache,
            locker,
            max_threads,
            transaction_attribute,
            transaction_timeout,
            message_size_warn,
            transform_null_message,
        } = self;

        if name.contains('/') {
            report(
                ConfigurationError::new(format!("pipeline name [{name}] must not contain '/'"))
                    .with_component(&component),
            );
        }
        if max_threads == Some(0) {
            report(ConfigurationError::new("maxThreads must be at least 1").with_component(&component));
        }

        let mut pipe_index = HashMap::new();
        for (i, spec) in pipes.iter().enumerate() {
            if let Err(e) = validate_pipe_name(spec.name()) {
                report(e);
            }
            if pipe_index.insert(spec.name().to_string(), i).is_some() {
                report(
                    ConfigurationError::new(format!("pipe [{}] is defined more than once", spec.name()))
                        .with_component(&component),
                );
            }
        }
        for spec in [&input_validator, &output_validator, &input_wrapper, &output_wrapper]
            .into_iter()
            .flatten()
        {
            if let Err(e) = validate_pipe_name(spec.name()) {
                report(e);
            }
        }

        if exits.is_empty() {
            debug!(pipeline = %name, "no exits configured, adding default exit [{DEFAULT_EXIT_NAME}]");
            exits.push(PipeLineExit::success(DEFAULT_EXIT_NAME));
        }
        let mut exit_names = HashSet::new();
        for exit in &exits {
            if !exit_names.insert(exit.name().to_string()) {
                report(
                    ConfigurationError::new(format!("exit [{}] is defined more than once", exit.name()))
                        .with_component(&component),
                );
            }
        }

        let first_pipe = match first_pipe {
            None => 0,
            Some(first) => match pipe_index.get(&first) {
                Some(&i) => i,
                None => {
                    report(
                        ConfigurationError::new(format!("firstPipe [{first}] does not exist"))
                            .with_component(&component),
                    );
                    0
                }
            },
        };

        let default_exit = exits
            .iter()
            .find(|e| e.state() == ExitState::Success)
            .or_else(|| exits.first())
            .map(|e| e.name().to_string())
            .unwrap_or_else(|| DEFAULT_EXIT_NAME.to_string());
        let next_names: Vec<String> = pipes
            .iter()
            .skip(1)
            .map(|p| p.name().to_string())
            .chain(std::iter::once(default_exit))
            .collect();

        for (spec, next) in pipes.iter_mut().zip(next_names) {
            for forward in &global_forwards {
                if !spec.has_forward(forward.name()) {
                    spec.add_forward(forward.clone());
                }
            }
            if !spec.has_forward(SUCCESS_FORWARD) {
                debug!(pipeline = %name, pipe = %spec.name(), next = %next, "wiring success forward");
                spec.add_forward(PipeForward::success(next));
            }
        }

        let resolve = |spec: &mut PipeSpec| -> Option<ConfigurationError> {
            let mut errors: Option<ConfigurationError> = None;
            let forwards = spec.forwards().to_vec();
            for forward in forwards {
                let target = pipe_index
                    .get(forward.path())
                    .map(|&i| ForwardTarget::Pipe(i))
                    .or_else(|| {
                        exits
                            .iter()
                            .position(|e| e.name() == forward.path())
                            .map(ForwardTarget::Exit)
                    });
                match target {
                    Some(target) => spec.set_target(forward.name(), target),
                    None => {
                        errors = Some(ConfigurationError::suppress(
                            errors,
                            ConfigurationError::new(format!(
                                "forward [{}] points to unknown pipe or exit [{}]",
                                forward.name(),
                                forward.path()
                            ))
                            .with_component(format!("pipe [{}]", spec.name())),
                        ));
                    }
                }
            }
            if let Err(e) = spec.prepare() {
                errors = Some(ConfigurationError::suppress(errors, e));
            }
            errors
        };

        for spec in pipes
            .iter_mut()
            .chain(input_validator.iter_mut())
            .chain(output_validator.iter_mut())
            .chain(input_wrapper.iter_mut())
            .chain(output_wrapper.iter_mut())
        {
            if let Some(e) = resolve(spec) {
                report(e);
            }
        }

        if let Some(problems) = problems {
            return Err(problems);
        }

        debug!(
            pipeline = %name,
            pipes = pipes.len(),
            exits = exits.len(),
            "pipeline configured"
        );
        Ok(PipeLine {
            name,
            pipes,
            pipe_index,
            exits,
            first_pipe,
            input_validator,
            output_validator,
            input_wrapper,
            output_wrapper,
            cache,
            locker,
            max_threads,
            transaction_attribute,
            transaction_timeout,
            message_size_warn,
            transform_null_message,
        })
    }
}

fn validate_pipe_name(name: &str) -> Result<(), ConfigurationError> {
    if name.trim().is_empty() {
        return Err(ConfigurationError::new("pipe name must not be empty"));
    }
    if name.contains('/') {
        return Err(ConfigurationError::new(format!("pipe name [{name}] must not contain '/'"))
            .with_component(format!("pipe [{name}]")));
    }
    Ok(())
}
