//! Metric names and recorder setup for the crosstalk relay.
//!
//! Uses the `metrics` crate facade. Library crates only record; the host
//! process installs a recorder with [`init_metrics`].
//!
//! ```rust,ignore
//! use crosstalk_metrics::{counter, relay};
//!
//! counter!(relay::JOBS_ENQUEUED_TOTAL).increment(1);
//! ```
//!
//! # Features
//!
//! - `prometheus`: install a Prometheus recorder, optionally serving `/metrics`

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
