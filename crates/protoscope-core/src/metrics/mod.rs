//! Metrics collection for the dissection engine.
//!
//! Provides Prometheus-compatible counters for decoded messages, errors by
//! kind, matcher outcomes and stream activity.

pub mod prometheus;

pub use prometheus::ScopeMetrics;
