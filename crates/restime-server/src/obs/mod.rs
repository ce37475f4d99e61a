//! In-process resource metrics.
//!
//! The registry implements the interceptor's `MetricSink` and is rendered by
//! the `/metrics` handler in Prometheus text format.

pub mod metrics;

pub use metrics::ResourceMetrics;
