//! Metric name and label definitions.
//!
//! Centralizing these keeps dashboards and code in agreement about what exists.

/// Relay queue and fan-out metrics
pub mod relay {
    /// Total relay jobs accepted into the queue
    pub const JOBS_ENQUEUED_TOTAL: &str = "crosstalk_relay_jobs_enqueued_total";
    /// Total relay jobs whose fan-out fully settled
    pub const JOBS_DRAINED_TOTAL: &str = "crosstalk_relay_jobs_drained_total";
    /// Jobs waiting in the queue
    pub const QUEUE_DEPTH: &str = "crosstalk_relay_queue_depth";
    /// Time from enqueue to settled fan-out in seconds
    pub const JOB_LATENCY_SECONDS: &str = "crosstalk_relay_job_latency_seconds";
    /// Successful per-destination deliveries
    pub const DELIVERIES_TOTAL: &str = "crosstalk_relay_deliveries_total";
    /// Failed per-destination deliveries
    pub const DELIVERY_ERRORS_TOTAL: &str = "crosstalk_relay_delivery_errors_total";
}

/// Destination registry metrics
pub mod registry {
    /// Enabled destinations with a live endpoint handle
    pub const LIVE_ENDPOINTS: &str = "crosstalk_registry_live_endpoints";
    /// Endpoints dropped after proving unreachable
    pub const INVALIDATIONS_TOTAL: &str = "crosstalk_registry_invalidations_total";
    /// Endpoints created through the channel collaborator
    pub const PROVISIONS_TOTAL: &str = "crosstalk_registry_provisions_total";
}

/// Moderation gate metrics
pub mod moderation {
    /// Messages rejected before enqueue
    pub const REJECTIONS_TOTAL: &str = "crosstalk_moderation_rejections_total";
    /// Messages relayed with redacted content
    pub const REDACTIONS_TOTAL: &str = "crosstalk_moderation_redactions_total";
    /// Filter failures that degraded open
    pub const FILTER_ERRORS_TOTAL: &str = "crosstalk_moderation_filter_errors_total";
}

/// Common label keys
pub mod labels {
    pub const REASON: &str = "reason";
    pub const KIND: &str = "kind";
}

/// Histogram buckets
pub mod buckets {
    /// Enqueue-to-settled job latency in seconds.
    /// Covers 5ms to 2 minutes (slow webhooks, rate-limit backoff)
    pub const JOB_LATENCY: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
    ];
}
