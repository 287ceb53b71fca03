use std::time::Duration;

/// Additive tallies for one run, or for a window of one when taken as a
/// difference of two snapshots.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Counter {
    pub sent:       u64,
    pub delivered:  u64,
    pub timeouts:   u64,
    pub rejections: u64,
    pub bytes:      u64,
    /// Sum of round-trip times of delivered requests.
    pub rtt:        Duration,
}

impl Counter {
    /// Requests that reached a terminal outcome.
    pub fn terminal(&self) -> u64 {
        self.delivered + self.timeouts + self.rejections
    }

    /// Requests that failed (timed out or rejected).
    pub fn lost(&self) -> u64 {
        self.timeouts + self.rejections
    }

    /// Requests sent but not yet resolved.
    pub fn pending(&self) -> u64 {
        self.sent.saturating_sub(self.terminal())
    }
}

impl std::ops::SubAssign<&Counter> for Counter {
    fn sub_assign(&mut self, rhs: &Counter) {
        self.sent -= rhs.sent;
        self.delivered -= rhs.delivered;
        self.timeouts -= rhs.timeouts;
        self.rejections -= rhs.rejections;
        self.bytes -= rhs.bytes;
        self.rtt -= rhs.rtt;
    }
}

impl std::ops::Sub for &Counter {
    type Output = Counter;

    fn sub(self, rhs: &Counter) -> Counter {
        let mut out = *self;
        out -= rhs;
        out
    }
}

/// Counters and timestamps for one run.
///
/// Timestamps are offsets from the run start, so a frozen `RunCounters` is a
/// self-contained value that can be summarized any number of times.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunCounters {
    pub counter:    Counter,
    /// Offset of the first delivery. Set at most once.
    pub first_byte: Option<Duration>,
    /// Offset at which the run was frozen.
    pub end:        Option<Duration>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time to first byte in milliseconds, if anything was delivered.
    pub fn time_to_first_byte_ms(&self) -> Option<f64> {
        self.first_byte.map(super::snapshot::as_millis_f64)
    }
}
