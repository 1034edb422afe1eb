//! Decorators of the pipe processor chain, innermost first.

mod core_processor;
mod exception;
mod input_output;
mod limit;
mod locker;
mod logging;
mod monitoring;
mod size_check;
mod track_previous;
mod transaction;

pub use core_processor::CorePipeProcessor;
pub use exception::ExceptionHandlingPipeProcessor;
pub use input_output::InputOutputPipeProcessor;
pub use limit::LimitingPipeProcessor;
pub use locker::LockerPipeProcessor;
pub use logging::LoggingPipeProcessor;
pub use monitoring::MonitoringPipeProcessor;
pub use size_check::SizeCheckPipeProcessor;
pub use track_previous::{TrackPreviousPipeProcessor, PREVIOUS_PIPE_KEY};
pub use transaction::TransactionPipeProcessor;
