//! Latency metrics for the query layer
//!
//! Records durations per named operation and derives count/average/min/max/total
//! on demand for the metrics export endpoint.

pub mod registry;

pub use registry::{MetricRegistry, OperationStats, TimerToken};
