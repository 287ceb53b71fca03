//! Per-request outcome ledger.
use std::{collections::HashMap, fmt, time::Duration};

use crate::name::Name;

use super::RunCounters;

/// The outcome of a single request.
///
/// Transitions are one way: `Pending` moves to exactly one terminal outcome,
/// which is never overwritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Sent, awaiting a response.
    Pending,
    /// Answered with a payload of the given size in bytes.
    Delivered(u64),
    /// Unanswered within the transport's lifetime.
    TimedOut,
    /// Explicitly refused (network nack).
    Rejected,
}

impl Outcome {
    /// Returns true for every outcome except [`Outcome::Pending`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pending => write!(f, "pending"),
            Outcome::Delivered(n) => write!(f, "delivered({n}B)"),
            Outcome::TimedOut => write!(f, "timed out"),
            Outcome::Rejected => write!(f, "rejected"),
        }
    }
}

/// What happened to a notification handed to the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recorded {
    /// The request moved to a terminal outcome and was counted.
    Counted {
        /// Offset at which the request had been sent.
        sent_at: Duration,
    },
    /// The name is not pending: it was already resolved, or never sent in
    /// this run. Nothing was counted.
    Unknown,
}

/// Records the requests of a run that are still in flight, and the counters
/// derived from all of them.
///
/// A request is forgotten as soon as its outcome is counted, so memory stays
/// proportional to the number of outstanding requests. Owned by a single
/// orchestrator. All timestamps are offsets from the run start.
#[derive(Debug, Default)]
pub struct OutcomeTracker {
    in_flight: HashMap<Name, Duration>,
    counters: RunCounters,
}

impl OutcomeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request that has just been sent.
    ///
    /// Returns false if the name is already in flight.
    pub fn on_sent(&mut self, name: Name, at: Duration) -> bool {
        if self.in_flight.contains_key(&name) {
            return false;
        }
        self.in_flight.insert(name, at);
        self.counters.counter.sent += 1;
        true
    }

    /// Move a request to a terminal outcome.
    ///
    /// Only the first terminal notification for a name is counted.
    pub fn resolve(&mut self, name: &Name, outcome: Outcome, at: Duration) -> Recorded {
        debug_assert!(outcome.is_terminal());
        let Some(sent_at) = self.in_flight.remove(name) else {
            return Recorded::Unknown;
        };

        let c = &mut self.counters.counter;
        match outcome {
            Outcome::Delivered(size) => {
                c.delivered += 1;
                c.bytes += size;
                c.rtt += at.saturating_sub(sent_at);
                if self.counters.first_byte.is_none() {
                    self.counters.first_byte = Some(at);
                }
            }
            Outcome::TimedOut => c.timeouts += 1,
            Outcome::Rejected => c.rejections += 1,
            Outcome::Pending => {}
        }
        Recorded::Counted { sent_at }
    }

    /// Whether a request is still awaiting its outcome.
    pub fn is_pending(&self, name: &Name) -> bool {
        self.in_flight.contains_key(name)
    }

    /// Requests still awaiting an outcome.
    pub fn pending(&self) -> u64 {
        self.counters.counter.pending()
    }

    /// Number of requests held in the ledger.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Live view of the run counters.
    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Stamp the end of the run and return the final counters.
    pub fn freeze(&mut self, end: Duration) -> RunCounters {
        self.counters.end = Some(end);
        self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_byte_is_set_once() {
        let mut t = OutcomeTracker::new();
        let a = Name::new("/p/0");
        let b = Name::new("/p/1");
        t.on_sent(a.clone(), ms(0));
        t.on_sent(b.clone(), ms(1));

        t.resolve(&a, Outcome::Delivered(100), ms(20));
        t.resolve(&b, Outcome::Delivered(100), ms(30));

        assert_eq!(t.counters().first_byte, Some(ms(20)));
        assert_eq!(t.counters().counter.rtt, ms(20 + 29));
    }

    #[test]
    fn first_byte_ignores_failures() {
        let mut t = OutcomeTracker::new();
        for i in 0..3 {
            t.on_sent(Name::new(format!("/p/{i}")), ms(0));
        }
        t.resolve(&Name::new("/p/0"), Outcome::TimedOut, ms(10));
        t.resolve(&Name::new("/p/1"), Outcome::Rejected, ms(11));
        assert_eq!(t.counters().first_byte, None);

        t.resolve(&Name::new("/p/2"), Outcome::Delivered(1), ms(12));
        assert_eq!(t.counters().first_byte, Some(ms(12)));
    }

    #[test]
    fn duplicate_notifications_are_not_counted() {
        let mut t = OutcomeTracker::new();
        let a = Name::new("/p/0");
        t.on_sent(a.clone(), ms(0));

        assert_eq!(t.resolve(&a, Outcome::Delivered(10), ms(5)), Recorded::Counted { sent_at: ms(0) });
        assert_eq!(t.resolve(&a, Outcome::Delivered(10), ms(6)), Recorded::Unknown);
        assert_eq!(t.resolve(&a, Outcome::TimedOut, ms(7)), Recorded::Unknown);

        let c = t.counters().counter;
        assert_eq!(c.delivered, 1);
        assert_eq!(c.bytes, 10);
        assert_eq!(c.timeouts, 0);
        assert!(!t.is_pending(&a));
    }

    #[test]
    fn unknown_names_are_discarded() {
        let mut t = OutcomeTracker::new();
        assert_eq!(t.resolve(&Name::new("/p/9"), Outcome::Rejected, ms(1)), Recorded::Unknown);
        assert_eq!(t.counters().counter, Default::default());
    }

    #[test]
    fn names_cannot_be_sent_twice() {
        let mut t = OutcomeTracker::new();
        assert!(t.on_sent(Name::new("/p/0"), ms(0)));
        assert!(!t.on_sent(Name::new("/p/0"), ms(1)));
        assert_eq!(t.counters().counter.sent, 1);
        assert_eq!(t.pending(), 1);
    }

    #[test]
    fn resolved_requests_are_forgotten() {
        let mut t = OutcomeTracker::new();
        for i in 0..100 {
            t.on_sent(Name::new(format!("/p/{i}")), ms(i));
        }
        assert_eq!(t.in_flight(), 100);

        for i in 0..60 {
            let outcome = if i % 2 == 0 { Outcome::Delivered(1) } else { Outcome::TimedOut };
            t.resolve(&Name::new(format!("/p/{i}")), outcome, ms(200));
        }
        assert_eq!(t.in_flight(), 40);
        assert_eq!(t.pending(), 40);
        assert_eq!(t.counters().counter.sent, 100);
        assert_eq!(t.counters().counter.terminal(), 60);
        assert!(t.is_pending(&Name::new("/p/99")));
        assert!(!t.is_pending(&Name::new("/p/0")));
    }

    #[test]
    fn freeze_stamps_end() {
        let mut t = OutcomeTracker::new();
        t.on_sent(Name::new("/p/0"), ms(0));
        let frozen = t.freeze(ms(500));
        assert_eq!(frozen.end, Some(ms(500)));
        assert_eq!(frozen.counter.pending(), 1);
    }
}
