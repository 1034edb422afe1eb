//! Observability utilities.

mod statistics;
mod tracing;

pub use statistics::{
    DistributionSummary, InMemoryStatistics, MeterType, NoOpStatistics, StatisticsSink,
};
pub use tracing::{init_tracing, LogFormat, SpanTimer, SECURITY_TARGET};
