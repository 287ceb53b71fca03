//! Statistics tracking for traffic runs.
//!
//! This module owns the accounting side of a run: which requests are in
//! flight, how each one ended, and the rates derived from those tallies.
//!
//! # Key Types
//!
//! - [`Counter`] - Additive tallies: sent, delivered, timed out, rejected, bytes.
//! - [`RunCounters`] - The tallies of one run plus first-byte and end offsets.
//! - [`OutcomeTracker`] - Per-request ledger enforcing one terminal outcome per name.
//! - [`MetricsSnapshot`] - Derived rates, loss, goodput and latency.
//! - [`MetricsAggregator`] - Windowed series and the final summary.

mod counter;
mod snapshot;
mod tracker;
mod window;

pub use counter::{Counter, RunCounters};
pub use snapshot::{MetricsSnapshot, NOT_COMPUTED, bitrate_kbps, loss_percent};
pub use tracker::{Outcome, OutcomeTracker, Recorded};
pub use window::MetricsAggregator;

pub(crate) use snapshot::as_millis_f64;
