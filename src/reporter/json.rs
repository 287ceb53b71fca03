use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Reporter;
use crate::{
    histogram::LatencySummary,
    name::Name,
    report::{ConsumerReport, ProducerReport},
    stats::MetricsSnapshot,
};

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn print_consumer(&self, w: &mut dyn Write, report: &ConsumerReport) -> anyhow::Result<()> {
        let counter = &report.counters.counter;
        let out = Consumer {
            prefix: &report.prefix,
            started_at: report.started_at,
            stop: report.stop.to_string(),
            total_time: report.elapsed.as_secs_f64(),
            cancelled: report.cancelled,
            requests: Requests {
                sent: counter.sent,
                delivered: counter.delivered,
                timeouts: counter.timeouts,
                rejections: counter.rejections,
                abandoned: report.abandoned,
                discarded: report.discarded,
            },
            bytes_delivered: counter.bytes,
            summary: &report.summary,
            latency: report.hist.summary(),
            windows: &report.windows,
        };
        serde_json::to_writer_pretty(&mut *w, &out)?;
        writeln!(w)?;
        Ok(())
    }

    fn print_producer(&self, w: &mut dyn Write, report: &ProducerReport) -> anyhow::Result<()> {
        let out = Producer {
            prefix: &report.prefix,
            started_at: report.started_at,
            exit: report.exit.to_string(),
            requests_received: report.requests_received,
            requests_satisfied: report.requests_satisfied,
            requests_ignored: report.ignored,
            content_size: report.content_size,
            bytes_sent: report.bytes_sent,
            elapsed: report.elapsed.map(|e| e.as_secs_f64()),
            bitrate_kbps: report.bitrate_kbps(),
        };
        serde_json::to_writer_pretty(&mut *w, &out)?;
        writeln!(w)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct Requests {
    sent: u64,
    delivered: u64,
    timeouts: u64,
    rejections: u64,
    abandoned: u64,
    discarded: u64,
}

#[derive(Serialize)]
struct Consumer<'a> {
    prefix: &'a Name,
    started_at: DateTime<Utc>,
    stop: String,
    total_time: f64,
    cancelled: bool,
    requests: Requests,
    bytes_delivered: u64,
    summary: &'a MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency: Option<LatencySummary>,
    #[serde(skip_serializing_if = "no_windows")]
    windows: &'a [MetricsSnapshot],
}

#[derive(Serialize)]
struct Producer<'a> {
    prefix: &'a Name,
    started_at: DateTime<Utc>,
    exit: String,
    requests_received: u64,
    requests_satisfied: u64,
    requests_ignored: u64,
    content_size: u64,
    bytes_sent: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bitrate_kbps: Option<f64>,
}

fn no_windows(v: &&[MetricsSnapshot]) -> bool {
    v.is_empty()
}
