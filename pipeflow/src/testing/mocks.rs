//! Mock pipes for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::core::{Message, PipeLineSession, PipeRunResult};
use crate::errors::{ConfigurationError, PipeRunError};
use crate::pipes::Pipe;

/// A pipe that returns its input unchanged.
#[derive(Debug)]
pub struct EchoPipe {
    name: String,
}

impl EchoPipe {
    /// Creates a new echo pipe.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Pipe for EchoPipe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        message: Message,
        _session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError> {
        Ok(PipeRunResult::new(message))
    }
}

/// A pipe that returns a fixed result on a fixed forward.
#[derive(Debug)]
pub struct FixedPipe {
    name: String,
    result: Message,
    forward: Option<String>,
}

impl FixedPipe {
    /// Creates a pipe that returns `result` on the `success` forward.
    #[must_use]
    pub fn new(name: impl Into<String>, result: impl Into<Message>) -> Self {
        Self {
            name: name.into(),
            result: result.into(),
            forward: None,
        }
    }

    /// Routes the result to `forward`.
    #[must_use]
    pub fn with_forward(mut self, forward: impl Into<String>) -> Self {
        self.forward = Some(forward.into());
        self
    }
}

#[async_trait]
impl Pipe for FixedPipe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _message: Message,
        _session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError> {
        Ok(match &self.forward {
            Some(forward) => PipeRunResult::with_forward(self.result.clone(), forward.clone()),
            None => PipeRunResult::new(self.result.clone()),
        })
    }
}

/// A pipe that always fails.
#[derive(Debug)]
pub struct FailingPipe {
    name: String,
    message: String,
    generates_exceptions: bool,
    transactional: bool,
    configuration_error: Option<String>,
}

impl FailingPipe {
    /// Creates a pipe that fails with `message`.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            generates_exceptions: false,
            transactional: false,
            configuration_error: None,
        }
    }

    /// Declares the pipe as one that raises errors on purpose.
    #[must_use]
    pub fn generating_exceptions(mut self) -> Self {
        self.generates_exceptions = true;
        self
    }

    /// Declares the pipe as writing to a transactional resource.
    #[must_use]
    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    /// Makes `configure` fail with `message`.
    #[must_use]
    pub fn misconfigured(mut self, message: impl Into<String>) -> Self {
        self.configuration_error = Some(message.into());
        self
    }
}

#[async_trait]
impl Pipe for FailingPipe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _message: Message,
        _session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError> {
        Err(PipeRunError::execution(&self.name, &self.message))
    }

    fn configure(&self) -> Result<(), ConfigurationError> {
        match &self.configuration_error {
            Some(message) => Err(ConfigurationError::new(message.clone())),
            None => Ok(()),
        }
    }

    fn generates_exceptions(&self) -> bool {
        self.generates_exceptions
    }

    fn uses_transactional_resource(&self) -> bool {
        self.transactional
    }
}

/// A pipe that panics.
#[derive(Debug)]
pub struct PanickingPipe {
    name: String,
}

impl PanickingPipe {
    /// Creates a new panicking pipe.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Pipe for PanickingPipe {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::panic)]
    async fn run(
        &self,
        _message: Message,
        _session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError> {
        panic!("pipe [{}] exploded", self.name)
    }
}

/// A pipe that counts calls, records its inputs and returns them uppercased.
#[derive(Debug, Clone)]
pub struct CountingPipe {
    name: String,
    calls: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<Option<String>>>>,
}

impl CountingPipe {
    /// Creates a new counting pipe.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the inputs received so far.
    #[must_use]
    pub fn inputs(&self) -> Vec<Option<String>> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Pipe for CountingPipe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        message: Message,
        _session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = message.as_string();
        self.inputs.lock().push(text.clone());
        Ok(PipeRunResult::new(text.map(|t| t.to_uppercase())))
    }
}

/// A pipe that blocks every call until it is released, tracking how many
/// calls are inside at once.
#[derive(Debug, Clone)]
pub struct BlockingPipe {
    name: String,
    gate: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl BlockingPipe {
    /// Creates a pipe whose calls block until [`release`](Self::release) is called.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gate: Arc::new(Semaphore::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Lets `calls` blocked calls complete.
    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    /// Returns the number of calls currently inside the pipe.
    #[must_use]
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the highest number of calls that were inside the pipe at once.
    #[must_use]
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Returns the number of completed calls.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pipe for BlockingPipe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        message: Message,
        _session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(PipeRunResult::new(message))
    }
}

/// A pipe that stores its input in the session under a key and passes it on.
#[derive(Debug)]
pub struct SessionWritingPipe {
    name: String,
    key: String,
}

impl SessionWritingPipe {
    /// Creates a pipe that writes its input to `key`.
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl Pipe for SessionWritingPipe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        message: Message,
        session: &mut PipeLineSession,
    ) -> Result<PipeRunResult, PipeRunError> {
        session.insert(self.key.clone(), message.clone());
        Ok(PipeRunResult::new(message))
    }
}
