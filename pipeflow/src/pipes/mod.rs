//! Pipe trait and the configured pipe.
//!
//! A [`Pipe`] is a named unit of work. The engine never calls it directly:
//! every invocation goes through the pipe processor chain, which applies the
//! [`PipeSettings`] of the configured [`PipeSpec`].

mod settings;

pub use settings::PipeSettings;

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::core::{Message, PipeForward, PipeLineSession, PipeRunResult};
use crate::errors::{ConfigurationError, PipeRunError};
use crate::utils::Compactor;

/// A unit of message-processing work.
#[async_trait]
pub trait Pipe: Send + Sync + Debug {
    /// Returns the name of the pipe, unique within its pipeline.
    fn name(&self) -> &str;

    /// Processes a message.
    ///
    /// The returned forward name must be one the pipe declares. A result
    /// without a forward continues on the `success` forward.
    async fn run(
        &self,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError>;

    /// Validates a message. Used when the pipe acts as a pipeline validator.
    async fn validate(
        &self,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError> {
        self.run(message, session).await
    }

    /// Checks the pipe's own configuration.
    fn configure(&self) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Returns true if the pipe should be bypassed for this input.
    fn skip_pipe(&self, _input: &Message, _session: &PipeLineSession) -> bool {
        false
    }

    /// Returns true if the pipe exists to raise errors; its failures are never
    /// routed to an `exception` forward.
    fn generates_exceptions(&self) -> bool {
        false
    }

    /// Returns true if the pipe writes to a transactional resource.
    fn uses_transactional_resource(&self) -> bool {
        false
    }
}

/// A pipe backed by a closure.
pub struct FnPipe<F>
where
    F: Fn(Message, &mut PipeLineSession) -> Result<PipeRunResult, PipeRunError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnPipe<F>
where
    F: Fn(Message, &mut PipeLineSession) -> Result<PipeRunResult, PipeRunError> + Send + Sync,
{
    /// Creates a new function-based pipe.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnPipe<F>
where
    F: Fn(Message, &mut PipeLineSession) -> Result<PipeRunResult, PipeRunError> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPipe").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Pipe for FnPipe<F>
where
    F: Fn(Message, &mut PipeLineSession) -> Result<PipeRunResult, PipeRunError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError> {
        (self.func)(message, session)
    }
}

/// Where a forward leads, resolved when the pipeline is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardTarget {
    /// Index of a pipe in the pipeline.
    Pipe(usize),
    /// Index of an exit in the pipeline.
    Exit(usize),
}

/// A pipe together with its settings and forwards.
#[derive(Clone)]
pub struct PipeSpec {
    pipe: Arc<dyn Pipe>,
    settings: PipeSettings,
    forwards: Vec<PipeForward>,
    targets: HashMap<String, ForwardTarget>,
    compactor: Compactor,
    hide_pattern: Option<Regex>,
}

impl PipeSpec {
    /// Wraps a pipe with default settings and no forwards.
    pub fn new(pipe: impl Pipe + 'static) -> Self {
        Self::from_arc(Arc::new(pipe))
    }

    /// Wraps a shared pipe.
    #[must_use]
    pub fn from_arc(pipe: Arc<dyn Pipe>) -> Self {
        Self {
            pipe,
            settings: PipeSettings::default(),
            forwards: Vec::new(),
            targets: HashMap::new(),
            compactor: Compactor::default(),
            hide_pattern: None,
        }
    }

    /// Declares a forward. A later forward with the same name replaces the earlier one.
    #[must_use]
    pub fn with_forward(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.add_forward(PipeForward::new(name, path));
        self
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: PipeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the pipe name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.pipe.name()
    }

    /// Returns the pipe.
    #[must_use]
    pub fn pipe(&self) -> &dyn Pipe {
        self.pipe.as_ref()
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &PipeSettings {
        &self.settings
    }

    /// Returns the declared forwards in declaration order.
    #[must_use]
    pub fn forwards(&self) -> &[PipeForward] {
        &self.forwards
    }

    /// Returns the forward with the given name.
    #[must_use]
    pub fn find_forward(&self, name: &str) -> Option<&PipeForward> {
        self.forwards.iter().find(|f| f.name() == name)
    }

    /// Returns true if the pipe declares the forward.
    #[must_use]
    pub fn has_forward(&self, name: &str) -> bool {
        self.find_forward(name).is_some()
    }

    /// Returns the resolved target of a forward.
    #[must_use]
    pub fn target(&self, forward: &str) -> Option<ForwardTarget> {
        self.targets.get(forward).copied()
    }

    /// Returns the result compactor.
    #[must_use]
    pub fn compactor(&self) -> &Compactor {
        &self.compactor
    }

    /// Returns the compiled masking pattern.
    #[must_use]
    pub fn hide_pattern(&self) -> Option<&Regex> {
        self.hide_pattern.as_ref()
    }

    pub(crate) fn add_forward(&mut self, forward: PipeForward) {
        self.forwards.retain(|f| f.name() != forward.name());
        self.forwards.push(forward);
    }

    pub(crate) fn set_target(&mut self, forward: &str, target: ForwardTarget) {
        self.targets.insert(forward.to_string(), target);
    }

    /// Compiles derived settings and runs the pipe's own checks.
    pub(crate) fn prepare(&mut self) -> Result<(), ConfigurationError> {
        let component = format!("pipe [{}]", self.name());
        let mut problems: Option<ConfigurationError> = None;

        if self.settings.max_threads == Some(0) {
            problems = Some(ConfigurationError::suppress(
                problems,
                ConfigurationError::new("maxThreads must be at least 1").with_component(&component),
            ));
        }

        if let Some(pattern) = &self.settings.hide_regex {
            match Regex::new(pattern) {
                Ok(regex) => self.hide_pattern = Some(regex),
                Err(e) => {
                    problems = Some(ConfigurationError::suppress(
                        problems,
                        ConfigurationError::new(format!("invalid hideRegex [{pattern}]: {e}"))
                            .with_component(&component),
                    ));
                }
            }
        }

        match Compactor::new(
            self.settings.chomp_char_size,
            self.settings.element_to_move.clone(),
            self.settings.element_to_move_session_key.clone(),
        ) {
            Ok(compactor) => self.compactor = compactor,
            Err(e) => {
                problems = Some(ConfigurationError::suppress(problems, e.with_component(&component)));
            }
        }

        if let Err(e) = self.pipe.configure() {
            let e = if e.component.is_none() {
                e.with_component(&component)
            } else {
                e
            };
            problems = Some(ConfigurationError::suppress(problems, e));
        }

        problems.map_or(Ok(()), Err)
    }
}

impl Debug for PipeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeSpec")
            .field("pipe", &self.pipe)
            .field("settings", &self.settings)
            .field("forwards", &self.forwards)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SUCCESS_FORWARD;

    fn upper() -> FnPipe<impl Fn(Message, &mut PipeLineSession) -> Result<PipeRunResult, PipeRunError> + Send + Sync> {
        FnPipe::new("upper", |message: Message, _session: &mut PipeLineSession| {
            let text = message.as_string().unwrap_or_default().to_uppercase();
            Ok(PipeRunResult::new(text))
        })
    }

    #[tokio::test]
    async fn test_fn_pipe_runs_closure() {
        let pipe = upper();
        let mut session = PipeLineSession::new();

        let result = pipe.run(Message::text("hello"), &mut session).await.unwrap();
        assert_eq!(result.result().as_string().as_deref(), Some("HELLO"));
        assert_eq!(result.forward_name(), SUCCESS_FORWARD);

        let validated = pipe.validate(Message::text("x"), &mut session).await.unwrap();
        assert_eq!(validated.result().as_string().as_deref(), Some("X"));
    }

    #[test]
    fn test_forward_replaces_same_name() {
        let spec = PipeSpec::new(upper())
            .with_forward("success", "A")
            .with_forward("exception", "Error")
            .with_forward("success", "B");

        assert_eq!(spec.forwards().len(), 2);
        assert_eq!(spec.find_forward("success").map(PipeForward::path), Some("B"));
        assert!(spec.has_forward("exception"));
        assert!(!spec.has_forward("failure"));
    }

    #[test]
    fn test_prepare_collects_problems() {
        let mut spec = PipeSpec::new(upper()).with_settings(
            PipeSettings::new()
                .with_max_threads(0)
                .with_hide_regex("("),
        );

        let err = spec.prepare().unwrap_err();
        assert_eq!(err.problem_count(), 2);
        assert_eq!(err.component.as_deref(), Some("pipe [upper]"));
    }

    #[test]
    fn test_prepare_compiles_settings() {
        let mut spec = PipeSpec::new(upper()).with_settings(
            PipeSettings::new()
                .with_hide_regex(r"\d{4}")
                .with_chomp_char_size(10),
        );

        spec.prepare().unwrap();
        assert!(spec.hide_pattern().is_some());
        assert!(spec.compactor().is_active());
    }
}
