//! Printing of run reports.
mod json;
mod text;

pub use json::JsonReporter;
pub use text::TextReporter;

use crate::report::{ConsumerReport, ProducerReport};

/// A trait for printing run reports.
pub trait Reporter {
    /// Print a consumer report to the given writer.
    fn print_consumer(&self, w: &mut dyn std::io::Write, report: &ConsumerReport) -> anyhow::Result<()>;

    /// Print a producer report to the given writer.
    fn print_producer(&self, w: &mut dyn std::io::Write, report: &ProducerReport) -> anyhow::Result<()>;
}
