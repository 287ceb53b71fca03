//! Outcome collection for a consumer run.
//!
//! The transport's notifications and the scheduler's send records arrive as
//! one ordered stream of [`RunEvent`]s. [`ResponseCollector`] applies them to
//! the run's [`OutcomeTracker`], records round-trip times and signals, once,
//! when a count-mode run has resolved every request.

use tokio::time::{Duration, Instant};

use crate::{
    clock::Clock,
    error::CollectorError,
    face::FaceEvent,
    histogram::LatencyHistogram,
    name::Name,
    stats::{Outcome, OutcomeTracker, Recorded, RunCounters},
};

/// An entry on a run's event channel.
#[derive(Debug, Clone)]
pub(crate) enum RunEvent {
    /// The scheduler is about to express `name`.
    Sent { name: Name, at: Instant },
    /// The face reported an outcome.
    Notified { event: FaceEvent, at: Instant },
}

/// Applies outcome notifications to a run's counters.
#[derive(Debug)]
pub struct ResponseCollector {
    clock: Clock,
    tracker: OutcomeTracker,
    hist: LatencyHistogram,
    target: Option<u64>,
    completed: bool,
    discarded: u64,
    last_outcome: Duration,
}

impl ResponseCollector {
    /// Create a collector for a run started at `clock`. With a `target`, the
    /// run completes once that many requests have reached a terminal outcome.
    pub fn new(clock: Clock, target: Option<u64>) -> Self {
        Self {
            clock,
            tracker: OutcomeTracker::new(),
            hist: LatencyHistogram::new(),
            target,
            completed: false,
            discarded: 0,
            last_outcome: Duration::ZERO,
        }
    }

    /// Apply one event from the run channel. Returns true when this event
    /// completed the run.
    pub(crate) fn handle(&mut self, event: RunEvent) -> Result<bool, CollectorError> {
        match event {
            RunEvent::Sent { name, at } => {
                self.on_sent(name, at);
                Ok(false)
            }
            RunEvent::Notified { event: FaceEvent::Data { name, payload_len }, at } => {
                self.on_delivered(&name, payload_len, at)
            }
            RunEvent::Notified { event: FaceEvent::Timeout { name }, at } => Ok(self.on_timed_out(&name, at)),
            RunEvent::Notified { event: FaceEvent::Nack { name, reason: _reason }, at } => {
                #[cfg(feature = "tracing")]
                log::trace!("Nack for {name}: {_reason}");
                Ok(self.on_rejected(&name, at))
            }
        }
    }

    /// Record a request as sent.
    pub fn on_sent(&mut self, name: Name, at: Instant) {
        let offset = self.clock.offset(at);
        if !self.tracker.on_sent(name, offset) {
            #[cfg(feature = "tracing")]
            log::warn!("Request name reused within a run; ignoring");
        }
    }

    /// A response of `payload_len` bytes arrived for `name`.
    pub fn on_delivered(&mut self, name: &Name, payload_len: u64, at: Instant) -> Result<bool, CollectorError> {
        if let Some(rtt) = self.settle(name, Outcome::Delivered(payload_len), at) {
            self.hist.record(rtt)?;
        }
        Ok(self.check_complete())
    }

    /// The request `name` timed out.
    pub fn on_timed_out(&mut self, name: &Name, at: Instant) -> bool {
        self.settle(name, Outcome::TimedOut, at);
        self.check_complete()
    }

    /// The request `name` was rejected.
    pub fn on_rejected(&mut self, name: &Name, at: Instant) -> bool {
        self.settle(name, Outcome::Rejected, at);
        self.check_complete()
    }

    /// Returns the round-trip time when the outcome was counted.
    fn settle(&mut self, name: &Name, outcome: Outcome, at: Instant) -> Option<Duration> {
        let offset = self.clock.offset(at);
        match self.tracker.resolve(name, outcome, offset) {
            Recorded::Counted { sent_at } => {
                #[cfg(feature = "tracing")]
                log::trace!("{name}: {outcome}");
                self.last_outcome = self.last_outcome.max(offset);
                Some(offset.saturating_sub(sent_at))
            }
            Recorded::Unknown => {
                #[cfg(feature = "tracing")]
                log::warn!("Discarding {outcome} for {name}: not pending");
                self.discarded += 1;
                None
            }
        }
    }

    fn check_complete(&mut self) -> bool {
        if self.completed {
            return false;
        }
        match self.target {
            Some(n) if self.tracker.counters().counter.terminal() >= n => {
                self.completed = true;
                true
            }
            _ => false,
        }
    }

    /// Whether the completion signal has fired.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Live counters.
    pub fn counters(&self) -> &RunCounters {
        self.tracker.counters()
    }

    pub fn tracker(&self) -> &OutcomeTracker {
        &self.tracker
    }

    /// Offset of the last counted outcome.
    pub fn last_outcome(&self) -> Duration {
        self.last_outcome
    }

    /// Notifications dropped as duplicates or for unknown names.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Freeze the counters at `end` and hand back the run's results.
    pub fn finish(mut self, end: Duration) -> (RunCounters, LatencyHistogram, u64) {
        let counters = self.tracker.freeze(end);
        (counters, self.hist, self.discarded)
    }
}
