//! Decorators of the pipeline processor chain, innermost first.

mod cache;
mod core_processor;
mod input_output;
mod limit;
mod locker;
mod transaction;

pub use cache::CachePipeLineProcessor;
pub use core_processor::CorePipeLineProcessor;
pub use input_output::InputOutputPipeLineProcessor;
pub use limit::LimitingPipeLineProcessor;
pub use locker::LockerPipeLineProcessor;
pub use transaction::TransactionPipeLineProcessor;
