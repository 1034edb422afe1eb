//! # Pipeflow
//!
//! A configuration-driven message processing engine.
//!
//! A [`PipeLine`](pipeline::PipeLine) is a graph of named pipes connected by
//! forwards and ending in exits. Every message is walked through the graph,
//! and every step is wrapped by a fixed chain of decorators that add:
//!
//! - **Exception forwards**: failures become error messages routed like any result
//! - **Input/output substitution**: session keys, fixed values, compaction
//! - **Resource control**: concurrency limits, locks and transactions
//! - **Observability**: `tracing` logs, monitoring events and statistics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipeflow::prelude::*;
//!
//! let pipeline = PipeLine::builder("orders")
//!     .with_pipe(PipeSpec::new(ParseOrder).with_forward("exception", "ERROR"))
//!     .with_pipe(PipeSpec::new(StoreOrder))
//!     .with_exit(PipeLineExit::success("READY"))
//!     .with_exit(PipeLineExit::error("ERROR").with_exit_code(500))
//!     .build()?;
//!
//! let adapter = Adapter::new(pipeline, Arc::new(EngineServices::default()));
//! let result = adapter.process("<order id=\"1\"/>").await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod formatting;
pub mod observability;
pub mod pipeline;
pub mod pipes;
pub mod processors;
pub mod resources;
pub mod services;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::core::{
        ExitState, Message, MessageData, PipeForward, PipeLineExit, PipeLineResult,
        PipeLineSession, PipeRunResult, EXCEPTION_FORWARD, FAILURE_FORWARD, SUCCESS_FORWARD,
    };
    pub use crate::errors::{
        ConfigurationError, PipeRunError, PipeRunErrorKind, PipeflowError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, MonitorEvent, NoOpEventSink};
    pub use crate::formatting::{ErrorMessageFormatter, JsonErrorMessageFormatter};
    pub use crate::observability::{init_tracing, LogFormat, MeterType, StatisticsSink};
    pub use crate::pipeline::{Adapter, PipeLine, PipeLineBuilder};
    pub use crate::pipes::{FnPipe, Pipe, PipeSettings, PipeSpec};
    pub use crate::resources::{
        Cache, InMemoryCache, InMemoryLocker, LocalTransactionManager, Locker, Propagation,
        TransactionManager,
    };
    pub use crate::services::EngineServices;
}
