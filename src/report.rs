//! Final records of consumer and producer runs.
use chrono::{DateTime, Utc};
use tokio::time::Duration;

use crate::{
    histogram::LatencyHistogram,
    name::Name,
    scheduler::StopCondition,
    stats::{MetricsSnapshot, RunCounters, bitrate_kbps},
};

/// The final consumer report.
#[derive(Debug, Clone)]
pub struct ConsumerReport {
    /// Prefix the requests were sent under.
    pub prefix: Name,
    /// Wall-clock time the run started.
    pub started_at: DateTime<Utc>,
    /// The configured stop condition.
    pub stop: StopCondition,
    /// Time from start until the face was released.
    pub elapsed: Duration,
    /// Frozen run counters.
    pub counters: RunCounters,
    /// Summary over the whole run.
    pub summary: MetricsSnapshot,
    /// Window records, oldest first. Empty when windows were disabled.
    pub windows: Vec<MetricsSnapshot>,
    /// Round-trip times of delivered requests.
    pub hist: LatencyHistogram,
    /// Requests still pending when the drain grace expired.
    pub abandoned: u64,
    /// Notifications dropped as duplicates or for unknown names.
    pub discarded: u64,
    /// Whether the run was cut short by cancellation.
    pub cancelled: bool,
}

/// Why a producer stopped serving.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProducerExit {
    /// The configured number of requests was satisfied.
    TargetReached,
    /// The prefix could not be registered.
    #[strum(to_string = "registration_failed: {reason}")]
    RegistrationFailed {
        /// Reason reported by the forwarder.
        reason: String,
    },
    /// The run was cancelled.
    Cancelled,
    /// The face went away while serving.
    FaceClosed,
}

/// The final producer report.
#[derive(Debug, Clone)]
pub struct ProducerReport {
    pub prefix: Name,
    pub started_at: DateTime<Utc>,
    pub exit: ProducerExit,
    pub requests_received: u64,
    pub requests_satisfied: u64,
    /// Content bytes sent, `satisfied * content_size`.
    pub bytes_sent: u64,
    pub content_size: u64,
    /// Time from the first request until the producer stopped. `None` when
    /// no request arrived.
    pub elapsed: Option<Duration>,
    /// Requests that arrived after the producer stopped.
    pub ignored: u64,
}

impl ProducerReport {
    /// Send bitrate in kilobits per second over [`elapsed`](Self::elapsed).
    pub fn bitrate_kbps(&self) -> Option<f64> {
        self.elapsed.map(|e| bitrate_kbps(self.bytes_sent, e.as_secs_f64()))
    }

    /// Whether the prefix registration failed.
    pub fn registration_failed(&self) -> bool {
        matches!(self.exit, ProducerExit::RegistrationFailed { .. })
    }
}
