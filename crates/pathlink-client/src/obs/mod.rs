//! Lightweight in-process metrics (dependency-free).
//!
//! Counters are plain atomics keyed by label sets and rendered in Prometheus
//! text format; the binary logs the rendering when a session ends.

pub mod metrics;

pub use metrics::ClientMetrics;
