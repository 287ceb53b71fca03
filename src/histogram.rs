//! Round-trip latency distribution of delivered requests.
use std::{collections::BTreeMap, time::Duration};

use hdrhistogram::Histogram;
use serde::Serialize;

use crate::{error::CollectorError, stats::as_millis_f64};

pub(crate) const PERCENTAGES: &[f64] = &[50.0, 75.0, 90.0, 95.0, 99.0, 99.9];

/// Histogram of request round-trip times, in nanoseconds.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    hist: Histogram<u64>,
}

impl LatencyHistogram {
    /// Creates an empty histogram.
    pub fn new() -> LatencyHistogram {
        // 3 significant digits with auto-resize never fails to construct
        Self { hist: Histogram::<u64>::new(3).expect("create histogram") }
    }

    /// Records one round-trip time.
    pub fn record(&mut self, rtt: Duration) -> Result<(), CollectorError> {
        let nanos = u64::try_from(rtt.as_nanos()).map_err(|_| CollectorError::LatencyTooLarge { latency: rtt })?;
        self.hist.record(nanos)?;
        Ok(())
    }

    /// Number of recorded samples.
    pub fn len(&self) -> u64 {
        self.hist.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.hist.is_empty()
    }

    pub fn min(&self) -> Duration {
        Duration::from_nanos(self.hist.min())
    }

    pub fn max(&self) -> Duration {
        Duration::from_nanos(self.hist.max())
    }

    pub fn mean(&self) -> Duration {
        Duration::from_nanos(self.hist.mean() as u64)
    }

    pub fn stdev(&self) -> Duration {
        Duration::from_nanos(self.hist.stdev() as u64)
    }

    pub fn median(&self) -> Duration {
        self.value_at_quantile(0.5)
    }

    /// The round-trip time at quantile `q` in `[0, 1]`.
    pub fn value_at_quantile(&self, q: f64) -> Duration {
        Duration::from_nanos(self.hist.value_at_quantile(q))
    }

    /// Round-trip time at each of the given percentages.
    pub fn percentiles<'a>(&'a self, percentages: &'a [f64]) -> impl Iterator<Item = (f64, Duration)> + 'a {
        percentages.iter().map(|&p| (p, self.value_at_quantile(p / 100.0)))
    }

    /// Summary in milliseconds, or `None` when nothing was delivered.
    pub fn summary(&self) -> Option<LatencySummary> {
        if self.is_empty() {
            return None;
        }
        Some(LatencySummary {
            samples: self.len(),
            min_ms: as_millis_f64(self.min()),
            mean_ms: as_millis_f64(self.mean()),
            median_ms: as_millis_f64(self.median()),
            max_ms: as_millis_f64(self.max()),
            stdev_ms: as_millis_f64(self.stdev()),
            percentiles_ms: self
                .percentiles(PERCENTAGES)
                .map(|(p, v)| (format!("p{p}"), as_millis_f64(v)))
                .collect(),
        })
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub max_ms: f64,
    pub stdev_ms: f64,
    pub percentiles_ms: BTreeMap<String, f64>,
}
