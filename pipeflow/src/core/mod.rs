//! Core data model of the engine.
//!
//! This module contains the values that flow through a pipeline:
//! - Messages and the per-invocation session
//! - Forwards and exits that make up the routing graph
//! - Pipe and pipeline results

mod exit;
mod forward;
mod message;
mod result;
mod session;
mod trace;

pub use exit::{ExitState, PipeLineExit, DEFAULT_EXIT_NAME};
pub use forward::{PipeForward, EXCEPTION_FORWARD, FAILURE_FORWARD, SUCCESS_FORWARD};
pub use message::{Message, MessageContext, MessageData};
pub use result::{Outcome, PipeLineResult, PipeRunResult};
pub use session::{
    PipeLineSession, SessionValue, CORRELATION_ID_KEY, EXIT_CODE_KEY, EXIT_STATE_KEY,
    MESSAGE_ID_KEY, ORIGINAL_MESSAGE_KEY, TS_RECEIVED_KEY,
};
pub use trace::{TraceContext, TraceScope};
