//! Error types for traffic runs.
//!
//! Per-request failures (timeouts, nacks) are never errors: they are counted
//! and reported. The types here cover the transport boundary, metrics
//! recording and the orchestration of a run.
use std::time::Duration;

use thiserror::Error;

use crate::name::Name;

/// Failures reported by a face (the transport collaborator).
#[derive(Debug, Error)]
pub enum FaceError {
    /// The face has been shut down or its peer has gone away.
    #[error("face is closed")]
    Closed,

    /// The forwarder refused to register a prefix.
    #[error("failed to register prefix {prefix}: {reason}")]
    Registration {
        /// The prefix that could not be registered.
        prefix: Name,
        /// Reason reported by the forwarder.
        reason: String,
    },

    /// No route exists for the requested name.
    #[error("no route for {name}")]
    NoRoute {
        /// The name that could not be routed.
        name: Name,
    },

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures while recording metrics.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Latency does not fit in the histogram's value range.
    #[error("latency too large to record: {latency:?}")]
    LatencyTooLarge {
        /// The offending latency.
        latency: Duration,
    },

    /// The histogram refused the sample.
    #[error("failed to record latency: {0}")]
    HistogramRecord(#[from] hdrhistogram::RecordError),
}

/// Failures that abort a consumer or producer run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Transport failure outside of per-request outcomes.
    #[error(transparent)]
    Face(#[from] FaceError),

    /// Metrics could not be recorded.
    #[error(transparent)]
    Collector(#[from] CollectorError),

    /// A run task panicked or was aborted.
    #[error("run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// All event senders went away before the run finished.
    #[error("event channel closed unexpectedly")]
    EventChannelClosed,

    /// Run options are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type used across the crate.
pub type Result<T, E = RunError> = std::result::Result<T, E>;
