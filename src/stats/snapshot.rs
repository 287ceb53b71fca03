use std::time::Duration;

use serde::{Serialize, Serializer};

use super::{Counter, RunCounters};

/// Marker written in place of metrics that cannot be computed yet.
pub const NOT_COMPUTED: &str = "not computed";

/// Derived statistics for one window, or for a whole run.
///
/// Totals (`requests_sent` and friends) are cumulative. Rates, loss, goodput
/// and latency cover only the span between the two counter snapshots the
/// record was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the run started.
    pub elapsed_secs: f64,
    /// Seconds covered by this record.
    pub span_secs: f64,
    pub requests_sent: u64,
    pub responses_delivered: u64,
    pub timeouts: u64,
    pub rejections: u64,
    /// Requests sent per second over the span.
    pub request_rate: f64,
    /// Responses delivered per second over the span.
    pub delivery_rate: f64,
    /// `100 * (timeouts + rejections) / sent` over the span, 0 with nothing sent.
    pub loss_percent: f64,
    /// Payload delivered over the span, in kilobytes.
    pub goodput_kb: f64,
    /// Payload delivered since the run started, in kilobytes.
    pub total_goodput_kb: f64,
    /// Payload bitrate over the span, in kilobits per second.
    pub bitrate_kbps: f64,
    #[serde(serialize_with = "or_not_computed")]
    pub time_to_first_byte_ms: Option<f64>,
    /// Mean round-trip time of deliveries in the span.
    #[serde(serialize_with = "or_not_computed")]
    pub latency_ms: Option<f64>,
}

impl MetricsSnapshot {
    /// Derive a record from the counters at `now`, against a baseline taken
    /// at `prev_at`.
    ///
    /// This is a pure function: the same inputs always give the same record.
    pub fn between(prev: &Counter, prev_at: Duration, current: &RunCounters, now: Duration) -> Self {
        let total = &current.counter;
        let delta = total - prev;
        let span = now.saturating_sub(prev_at).as_secs_f64();

        Self {
            elapsed_secs: now.as_secs_f64(),
            span_secs: span,
            requests_sent: total.sent,
            responses_delivered: total.delivered,
            timeouts: total.timeouts,
            rejections: total.rejections,
            request_rate: rate(delta.sent as f64, span),
            delivery_rate: rate(delta.delivered as f64, span),
            loss_percent: loss_percent(&delta),
            goodput_kb: delta.bytes as f64 / 1000.0,
            total_goodput_kb: total.bytes as f64 / 1000.0,
            bitrate_kbps: bitrate_kbps(delta.bytes, span),
            time_to_first_byte_ms: current.time_to_first_byte_ms(),
            latency_ms: mean_latency_ms(&delta),
        }
    }

    /// Summarize a whole run, from its start to its recorded end (or `now`
    /// when the counters have not been frozen).
    pub fn summary(counters: &RunCounters, now: Duration) -> Self {
        let end = counters.end.unwrap_or(now);
        Self::between(&Counter::default(), Duration::ZERO, counters, end)
    }
}

/// Loss over a counter delta, as a percentage of requests sent.
pub fn loss_percent(c: &Counter) -> f64 {
    if c.sent == 0 {
        return 0.0;
    }
    100.0 * c.lost() as f64 / c.sent as f64
}

/// `(bytes * 8 / 1000) / secs`, or 0 over an empty span.
pub fn bitrate_kbps(bytes: u64, secs: f64) -> f64 {
    rate(bytes as f64 * 8.0 / 1000.0, secs)
}

fn rate(n: f64, secs: f64) -> f64 {
    if secs > 0.0 { n / secs } else { 0.0 }
}

fn mean_latency_ms(c: &Counter) -> Option<f64> {
    if c.delivered == 0 {
        return None;
    }
    Some(as_millis_f64(c.rtt) / c.delivered as f64)
}

pub(crate) fn as_millis_f64(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}

fn or_not_computed<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(v) => s.serialize_f64(*v),
        None => s.serialize_str(NOT_COMPUTED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(sent: u64, delivered: u64, timeouts: u64, rejections: u64, bytes: u64) -> RunCounters {
        RunCounters {
            counter: Counter { sent, delivered, timeouts, rejections, bytes, rtt: Duration::from_millis(10 * delivered) },
            first_byte: (delivered > 0).then(|| Duration::from_millis(25)),
            end: Some(Duration::from_secs(2)),
        }
    }

    #[test]
    fn loss_is_share_of_failed_requests() {
        for (n, t, r) in [(10, 2, 1), (7, 0, 0), (3, 3, 0), (200, 13, 29)] {
            let c = Counter { sent: n, timeouts: t, rejections: r, delivered: n - t - r, ..Default::default() };
            let expected = 100.0 * (t + r) as f64 / n as f64;
            assert!((loss_percent(&c) - expected).abs() < 1e-9);
        }
        assert_eq!(loss_percent(&Counter::default()), 0.0);
    }

    #[test]
    fn all_delivered_summary() {
        let s = MetricsSnapshot::summary(&counters(10, 10, 0, 0, 10_000), Duration::ZERO);
        assert_eq!(s.responses_delivered, 10);
        assert_eq!(s.loss_percent, 0.0);
        assert_eq!(s.goodput_kb, 10.0);
        assert_eq!(s.total_goodput_kb, 10.0);
        assert_eq!(s.bitrate_kbps, 40.0);
        assert_eq!(s.request_rate, 5.0);
        assert_eq!(s.time_to_first_byte_ms, Some(25.0));
        assert_eq!(s.latency_ms, Some(10.0));
    }

    #[test]
    fn mixed_outcomes_summary() {
        let s = MetricsSnapshot::summary(&counters(10, 7, 2, 1, 7_000), Duration::ZERO);
        assert!((s.loss_percent - 30.0).abs() < 1e-9);
    }

    #[test]
    fn zero_span_yields_sentinels() {
        let c = RunCounters { counter: Counter { sent: 5, bytes: 5000, ..Default::default() }, ..Default::default() };
        let s = MetricsSnapshot::between(&Counter::default(), Duration::from_secs(1), &c, Duration::from_secs(1));
        assert_eq!(s.span_secs, 0.0);
        assert_eq!(s.bitrate_kbps, 0.0);
        assert_eq!(s.request_rate, 0.0);
        assert_eq!(s.time_to_first_byte_ms, None);
        assert_eq!(s.latency_ms, None);
    }

    #[test]
    fn summary_is_a_pure_function() {
        let c = counters(10, 7, 2, 1, 7_000);
        let a = MetricsSnapshot::summary(&c, Duration::from_secs(9));
        let b = MetricsSnapshot::summary(&c, Duration::from_secs(9));
        assert_eq!(a, b);
    }

    #[test]
    fn missing_metrics_serialize_as_marker() {
        let s = MetricsSnapshot::summary(&RunCounters::default(), Duration::ZERO);
        let v = serde_json::to_value(s).unwrap();
        assert_eq!(v["time_to_first_byte_ms"], NOT_COMPUTED);
        assert_eq!(v["latency_ms"], NOT_COMPUTED);
        assert_eq!(v["loss_percent"], 0.0);
    }
}
