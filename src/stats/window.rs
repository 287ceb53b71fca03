//! Windowed metrics for real-time monitoring of a run.
//!
//! The aggregator keeps the cumulative counters seen at the previous tick and
//! derives each window as the difference against the current counters, the
//! same front-minus-back approach used for rolling rate windows.

use std::time::Duration;

use super::{Counter, MetricsSnapshot, RunCounters};

/// Builds the ordered series of window records for one run.
///
/// Call [`record`](Self::record) on a fixed cadence. The series is append
/// only; each call moves the baseline to the counters it was given.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    previous: Counter,
    previous_at: Duration,
    windows: Vec<MetricsSnapshot>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the current window at `now` and start the next one.
    pub fn record(&mut self, counters: &RunCounters, now: Duration) -> &MetricsSnapshot {
        let snapshot = MetricsSnapshot::between(&self.previous, self.previous_at, counters, now);
        self.previous = counters.counter;
        self.previous_at = now;
        let idx = self.windows.len();
        self.windows.push(snapshot);
        &self.windows[idx]
    }

    /// Summary of the whole run.
    pub fn summarize(&self, counters: &RunCounters, now: Duration) -> MetricsSnapshot {
        MetricsSnapshot::summary(counters, now)
    }

    /// Windows recorded so far, oldest first.
    pub fn windows(&self) -> &[MetricsSnapshot] {
        &self.windows
    }

    pub fn into_windows(self) -> Vec<MetricsSnapshot> {
        self.windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn with(sent: u64, delivered: u64, timeouts: u64, bytes: u64) -> RunCounters {
        RunCounters {
            counter: Counter { sent, delivered, timeouts, bytes, ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn windows_use_deltas_not_totals() {
        let mut agg = MetricsAggregator::new();

        let w1 = *agg.record(&with(10, 8, 2, 8000), at(500));
        assert_eq!(w1.requests_sent, 10);
        assert!((w1.loss_percent - 20.0).abs() < 1e-9);
        assert_eq!(w1.goodput_kb, 8.0);
        assert!((w1.bitrate_kbps - 128.0).abs() < 1e-9);

        let w2 = *agg.record(&with(20, 18, 2, 18000), at(1000));
        assert_eq!(w2.requests_sent, 20);
        assert_eq!(w2.loss_percent, 0.0);
        assert_eq!(w2.goodput_kb, 10.0);
        assert_eq!(w2.total_goodput_kb, 18.0);
        assert!((w2.bitrate_kbps - 160.0).abs() < 1e-9);
        assert!((w2.span_secs - 0.5).abs() < 1e-9);

        assert_eq!(agg.windows().len(), 2);
        assert_eq!(agg.windows()[0], w1);
    }

    #[test]
    fn idle_window_reports_zero() {
        let mut agg = MetricsAggregator::new();
        agg.record(&with(10, 10, 0, 1000), at(500));
        let w = *agg.record(&with(10, 10, 0, 1000), at(1000));
        assert_eq!(w.request_rate, 0.0);
        assert_eq!(w.loss_percent, 0.0);
        assert_eq!(w.bitrate_kbps, 0.0);
        assert_eq!(w.latency_ms, None);
    }

    #[test]
    fn zero_length_window_is_defined() {
        let mut agg = MetricsAggregator::new();
        agg.record(&with(1, 1, 0, 100), at(500));
        let w = *agg.record(&with(2, 2, 0, 200), at(500));
        assert_eq!(w.span_secs, 0.0);
        assert_eq!(w.bitrate_kbps, 0.0);
        assert!(w.bitrate_kbps.is_finite());
    }

    #[tokio::test(start_paused = true)]
    async fn late_window_covers_actual_span() {
        let clock = crate::clock::Clock::start_now();
        let mut ticker = clock.ticker(at(100));
        tokio::time::sleep(at(350)).await;

        let mut agg = MetricsAggregator::new();
        let now = ticker.tick().await;
        let w = *agg.record(&with(350, 350, 0, 350_000), now);
        assert!((w.elapsed_secs - 0.35).abs() < 1e-3, "window ends at {}", w.elapsed_secs);
        assert!((w.bitrate_kbps - 8000.0).abs() < 25.0, "bitrate {}", w.bitrate_kbps);
    }

    #[test]
    fn summary_covers_whole_run() {
        let mut agg = MetricsAggregator::new();
        let mut c = with(10, 10, 0, 10_000);
        agg.record(&c, at(500));
        c.end = Some(at(2000));
        let s = agg.summarize(&c, at(9999));
        assert!((s.elapsed_secs - 2.0).abs() < 1e-9);
        assert!((s.bitrate_kbps - 40.0).abs() < 1e-9);
        assert_eq!(s, agg.summarize(&c, at(9999)));
    }
}
