//! Duration, wait-time and size distributions.
//!
//! Decorators record measurements keyed by owner (the pipeline name, or
//! `pipeline/pipe` for a pipe) and meter. The engine only records; how the
//! numbers are exported is up to the sink.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a recorded value measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterType {
    /// Time spent running a pipe, in milliseconds.
    PipeDuration,
    /// Time spent waiting for a pipe's concurrency limit, in milliseconds.
    PipeWaitTime,
    /// Size of the message entering a pipe, in bytes.
    PipeSizeIn,
    /// Size of the message leaving a pipe, in bytes.
    PipeSizeOut,
    /// Time spent processing a whole message, in milliseconds.
    PipelineDuration,
    /// Time spent waiting for the pipeline's concurrency limit, in milliseconds.
    PipelineWaitTime,
    /// Size of the message entering the pipeline, in bytes.
    PipelineRequestSize,
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PipeDuration => "pipe.duration",
            Self::PipeWaitTime => "pipe.wait_time",
            Self::PipeSizeIn => "pipe.size_in",
            Self::PipeSizeOut => "pipe.size_out",
            Self::PipelineDuration => "pipeline.duration",
            Self::PipelineWaitTime => "pipeline.wait_time",
            Self::PipelineRequestSize => "pipeline.request_size",
        };
        f.write_str(name)
    }
}

/// Receiver of measurements.
pub trait StatisticsSink: Send + Sync + fmt::Debug {
    /// Records one observation.
    fn record(&self, owner: &str, meter: MeterType, value: f64);
}

/// A sink that discards every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatistics;

impl StatisticsSink for NoOpStatistics {
    fn record(&self, _owner: &str, _meter: MeterType, _value: f64) {}
}

/// Count, sum, minimum and maximum of a series of observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    /// Number of observations.
    pub count: u64,
    /// Sum of all observations.
    pub sum: f64,
    /// Smallest observation.
    pub min: f64,
    /// Largest observation.
    pub max: f64,
}

impl DistributionSummary {
    fn first(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Returns the mean observation.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Keeps a [`DistributionSummary`] per owner and meter.
#[derive(Debug, Default)]
pub struct InMemoryStatistics {
    summaries: DashMap<(String, MeterType), DistributionSummary>,
}

impl InMemoryStatistics {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the summary for an owner and meter.
    #[must_use]
    pub fn summary(&self, owner: &str, meter: MeterType) -> Option<DistributionSummary> {
        self.summaries
            .get(&(owner.to_string(), meter))
            .map(|entry| *entry.value())
    }

    /// Returns the number of observations for an owner and meter.
    #[must_use]
    pub fn count(&self, owner: &str, meter: MeterType) -> u64 {
        self.summary(owner, meter).map_or(0, |s| s.count)
    }

    /// Returns a snapshot of all summaries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, MeterType, DistributionSummary)> {
        self.summaries
            .iter()
            .map(|entry| {
                let (owner, meter) = entry.key();
                (owner.clone(), *meter, *entry.value())
            })
            .collect()
    }

    /// Discards all summaries.
    pub fn reset(&self) {
        self.summaries.clear();
    }
}

impl StatisticsSink for InMemoryStatistics {
    fn record(&self, owner: &str, meter: MeterType, value: f64) {
        self.summaries
            .entry((owner.to_string(), meter))
            .and_modify(|summary| summary.observe(value))
            .or_insert_with(|| DistributionSummary::first(value));
    }
}
