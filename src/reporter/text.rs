use std::io::Write;

use crossterm::style::{StyledContent, Stylize};
use tabled::{
    builder::Builder,
    settings::{
        Alignment, Color, Margin, Padding, Style,
        object::{Cell, Columns, FirstColumn, LastColumn, Object, Rows},
        themes::Colorization,
    },
};

use super::Reporter;
use crate::{
    histogram::{LatencyHistogram, PERCENTAGES},
    report::{ConsumerReport, ProducerReport},
    stats::{MetricsSnapshot, NOT_COMPUTED, as_millis_f64},
    util::{IntoAdjustedByte, TryIntoAdjustedByte},
};

pub struct TextReporter;

impl Reporter for TextReporter {
    fn print_consumer(&self, w: &mut dyn Write, report: &ConsumerReport) -> anyhow::Result<()> {
        print_consumer_summary(w, report)?;
        writeln!(w)?;

        if !report.windows.is_empty() {
            print_windows(w, &report.windows)?;
            writeln!(w)?;
        }

        if !report.hist.is_empty() {
            print_latency(w, &report.hist)?;
            writeln!(w)?;
        }

        Ok(())
    }

    #[rustfmt::skip]
    fn print_producer(&self, w: &mut dyn Write, report: &ProducerReport) -> anyhow::Result<()> {
        writeln!(w, "{}", "Producer summary".h1())?;
        writeln!(w,       "  Prefix:     {}", report.prefix.to_string().green().bold())?;
        writeln!(w,       "  Stopped:    {}", render_exit(report))?;
        writeln!(w,       "  Received:   {}", report.requests_received.to_string().green().bold())?;
        writeln!(w,       "  Satisfied:  {}", report.requests_satisfied.to_string().green().bold())?;
        if report.ignored > 0 {
            writeln!(w,   "  Ignored:    {}", report.ignored.to_string().yellow().bold())?;
        }
        writeln!(w,       "  Data sent:  {}", format!("{:.2}", report.bytes_sent.adjusted()).green().bold())?;
        match (report.elapsed, report.bitrate_kbps()) {
            (Some(elapsed), Some(kbps)) => {
                writeln!(w,   "  Time:       {}", format!("{:.2}s", elapsed.as_secs_f64()).green().bold())?;
                writeln!(w,   "  Bitrate:    {}", format!("{kbps:.2} Kbps").green().bold())?;
            }
            _ => writeln!(w,  "  Time:       {}", NOT_COMPUTED.yellow())?,
        }
        writeln!(w)?;
        Ok(())
    }
}

fn render_loss(loss: f64) -> StyledContent<String> {
    let text = format!("{loss:.2}%");
    if loss <= 0.0 {
        text.green().bold()
    } else if loss <= 1.0 {
        text.yellow().bold()
    } else {
        text.red().bold()
    }
}

fn render_exit(report: &ProducerReport) -> StyledContent<String> {
    let text = report.exit.to_string();
    if report.registration_failed() { text.red().bold() } else { text.green().bold() }
}

fn render_ms(v: Option<f64>) -> String {
    match v {
        Some(ms) => format!("{ms:.2}ms"),
        None => NOT_COMPUTED.into(),
    }
}

#[rustfmt::skip]
fn print_consumer_summary(w: &mut dyn Write, report: &ConsumerReport) -> anyhow::Result<()> {
    let s = &report.summary;
    let counter = &report.counters.counter;

    writeln!(w, "{}", "Summary".h1())?;
    writeln!(w,       "  Prefix:        {}", report.prefix.to_string().green().bold())?;
    writeln!(w,       "  Mode:          {}", report.stop.to_string().green().bold())?;
    writeln!(w,       "  Time:          {}", format!("{:.2}s", s.elapsed_secs).green().bold())?;
    writeln!(w,       "  Loss:          {}", render_loss(s.loss_percent))?;
    writeln!(w,       "  First byte:    {}", render_ms(s.time_to_first_byte_ms).green().bold())?;
    if report.cancelled {
        writeln!(w,   "  Cancelled:     {}", "yes".yellow().bold())?;
    }
    writeln!(w)?;

    let stats = vec![
        vec!["".into(), "Total".into(), "Rate".into()],
        vec!["Sent".into(), counter.sent.to_string(), format!("{:.2}/s", s.request_rate)],
        vec!["Delivered".into(), counter.delivered.to_string(), format!("{:.2}/s", s.delivery_rate)],
        vec!["Timeouts".into(), counter.timeouts.to_string(), "".into()],
        vec!["Rejections".into(), counter.rejections.to_string(), "".into()],
        vec![
            "Goodput".into(),
            format!("{:.2}", counter.bytes.adjusted()),
            format!("{:.2}/s", (s.bitrate_kbps * 1000.0 / 8.0).adjusted()?),
        ],
        vec!["Bitrate".into(), "".into(), format!("{:.2} Kbps", s.bitrate_kbps)],
    ];
    let mut stats = Builder::from(stats).build();
    stats
        .with(Style::empty())
        .with(Alignment::center())
        .with(Padding::new(2, 2, 0, 0))
        .with(Colorization::exact([Color::BOLD], Cell::new(0, 1)))
        .with(Colorization::exact([Color::BOLD], Cell::new(0, 2)))
        .with(Colorization::exact([Color::FG_GREEN], Rows::new(1..=6).not(Columns::new(0..=0))))
    ;
    writeln!(w, "{}", stats)?;

    if report.abandoned > 0 {
        writeln!(w, "{}", format!("  {} requests still pending after the drain period", report.abandoned).yellow())?;
    }
    if report.discarded > 0 {
        writeln!(w, "{}", format!("  {} duplicate or unknown notifications discarded", report.discarded).yellow())?;
    }
    Ok(())
}

fn print_windows(w: &mut dyn Write, windows: &[MetricsSnapshot]) -> anyhow::Result<()> {
    writeln!(w, "{}", "Windows".h1())?;
    let header = ["Time", "Sent", "Delivered", "Timeouts", "Rejections", "Loss", "TTFB", "Goodput", "Total", "Bitrate", "Latency"];
    let rows = windows.iter().map(|s| {
        vec![
            format!("{:.2}s", s.elapsed_secs),
            s.requests_sent.to_string(),
            s.responses_delivered.to_string(),
            s.timeouts.to_string(),
            s.rejections.to_string(),
            format!("{:.2}%", s.loss_percent),
            render_ms(s.time_to_first_byte_ms),
            format!("{:.2}KB", s.goodput_kb),
            format!("{:.2}KB", s.total_goodput_kb),
            format!("{:.2}Kbps", s.bitrate_kbps),
            render_ms(s.latency_ms),
        ]
    });

    let mut builder = Builder::default();
    builder.push_record(header);
    for row in rows {
        builder.push_record(row);
    }
    let mut table = builder.build();
    table
        .with(Style::empty())
        .with(Margin::new(2, 0, 0, 0))
        .with(Alignment::right())
        .with(Padding::new(1, 1, 0, 0))
        .with(Colorization::exact([Color::BOLD], Rows::first()))
        .with(Colorization::exact([Color::FG_GREEN], Rows::new(1..).not(Columns::first())));
    writeln!(w, "{}", table)?;
    Ok(())
}

fn print_latency(w: &mut dyn Write, hist: &LatencyHistogram) -> anyhow::Result<()> {
    writeln!(w, "{}", "Round-trip times".h1())?;

    let stats = vec![
        vec!["Avg".into(), "Min".into(), "Med".into(), "Max".into(), "Stdev".into()],
        vec![
            format!("{:.2}ms", as_millis_f64(hist.mean())),
            format!("{:.2}ms", as_millis_f64(hist.min())),
            format!("{:.2}ms", as_millis_f64(hist.median())),
            format!("{:.2}ms", as_millis_f64(hist.max())),
            format!("{:.2}ms", as_millis_f64(hist.stdev())),
        ],
    ];
    let mut stats = Builder::from(stats).build();
    stats
        .with(Style::empty())
        .with(Margin::new(1, 0, 0, 0))
        .with(Alignment::center())
        .with(Colorization::exact([Color::FG_GREEN], Rows::new(1..=1)))
        .with(Colorization::exact([Color::FG_BLUE], Cell::new(0, 0)))
        .with(Colorization::exact([Color::FG_CYAN], Cell::new(0, 1)))
        .with(Colorization::exact([Color::FG_YELLOW], Cell::new(0, 2)))
        .with(Colorization::exact([Color::FG_RED], Cell::new(0, 3)))
        .with(Colorization::exact([Color::FG_MAGENTA], Cell::new(0, 4)));
    writeln!(w, "{}", stats)?;
    writeln!(w)?;

    writeln!(w, "{}", "  Percentiles".h2())?;
    let percentiles = hist
        .percentiles(PERCENTAGES)
        .map(|(p, v)| vec![format!("{p:.2}%"), " in ".to_string(), format!("{:.2}ms", as_millis_f64(v))]);
    let mut percentiles = Builder::from_iter(percentiles).build();
    percentiles
        .with(Style::empty())
        .with(Margin::new(3, 0, 0, 0))
        .with(Alignment::center())
        .with(Padding::zero())
        .with(Colorization::exact([Color::FG_GREEN], FirstColumn))
        .with(Colorization::exact([Color::FG_GREEN], LastColumn))
        .modify(LastColumn, Alignment::right());
    writeln!(w, "{}", percentiles)?;
    Ok(())
}

trait ReportStyle {
    fn h1(&self) -> StyledContent<&str>;
    fn h2(&self) -> StyledContent<&str>;
}

impl<T: AsRef<str>> ReportStyle for T {
    fn h1(&self) -> StyledContent<&str> {
        self.as_ref().bold().underlined().yellow()
    }

    fn h2(&self) -> StyledContent<&str> {
        self.as_ref().bold().cyan()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::time::Duration;

    use super::*;
    use crate::{
        name::Name,
        report::ProducerExit,
        scheduler::StopCondition,
        stats::{Counter, MetricsAggregator, RunCounters},
    };

    fn strip(buf: Vec<u8>) -> String {
        // drop ANSI escapes so assertions see plain text
        let s = String::from_utf8(buf).unwrap();
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn consumer_report_marks_missing_first_byte() {
        let counters = RunCounters {
            counter: Counter { sent: 4, timeouts: 4, ..Default::default() },
            end: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let mut agg = MetricsAggregator::new();
        agg.record(&counters, Duration::from_millis(500));
        let report = ConsumerReport {
            prefix: Name::new("/test"),
            started_at: Utc::now(),
            stop: StopCondition::Count(4),
            elapsed: Duration::from_secs(1),
            counters,
            summary: agg.summarize(&counters, Duration::from_secs(1)),
            windows: agg.into_windows(),
            hist: LatencyHistogram::new(),
            abandoned: 0,
            discarded: 0,
            cancelled: false,
        };

        let mut buf = Vec::new();
        TextReporter.print_consumer(&mut buf, &report).unwrap();
        let text = strip(buf);
        assert!(text.contains("100.00%"));
        assert!(text.contains(NOT_COMPUTED));
        assert!(text.contains("Windows"));
        assert!(!text.contains("Round-trip times"));
    }

    #[test]
    fn producer_report() {
        let report = ProducerReport {
            prefix: Name::new("/test"),
            started_at: Utc::now(),
            exit: ProducerExit::TargetReached,
            requests_received: 5,
            requests_satisfied: 5,
            bytes_sent: 5000,
            content_size: 1000,
            elapsed: Some(Duration::from_secs(1)),
            ignored: 0,
        };
        let mut buf = Vec::new();
        TextReporter.print_producer(&mut buf, &report).unwrap();
        let text = strip(buf);
        assert!(text.contains("target_reached"));
        assert!(text.contains("5.00 KB"));
        assert!(text.contains("40.00 Kbps"));
    }
}
