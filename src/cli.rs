//! Command-line front-ends for the consumer and the producer.
//!
//! [`ConsumerCli`] and [`ProducerCli`] can be parsed directly or flattened
//! into a larger CLI struct. [`run_consumer`] and [`run_producer`] take the
//! parsed options and something that opens faces.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use ndn_traffic::{cli::{ConsumerCli, run_consumer}, face::loopback::Loopback};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_consumer(ConsumerCli::parse(), Loopback::new()).await
//! }
//! ```
//!
//! ```shell
//! $ consumer --help
//! Usage: consumer [OPTIONS]
//!
//! Options:
//!   -p, --prefix <PREFIX>
//!           Prefix to request data from. Repeat to run several prefixes in sequence
//!
//!           [default: /ndn/external/test]
//!
//!   -n, --count <COUNT>
//!           Number of requests to send [aliases: -c]
//!
//!   -d, --duration <DURATION>
//!           How long to send requests for
//!
//!           Examples: -d 10s, -d 5m
//!
//!   -i, --interval <INTERVAL>
//!           Delay between requests
//!
//!           [default: 10us]
//!   ...
//! ```
use std::{
    fs::File,
    io::{Write, stdout},
    num::NonZeroU64,
    path::PathBuf,
};

use anyhow::bail;
use clap::{
    ArgAction, Parser, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "rate_limit")]
use std::num::NonZeroU32;

use crate::{
    consumer::{Consumer, ConsumerOpts},
    face::Connect,
    name::Name,
    producer::{Producer, ProducerOpts},
    reporter::{JsonReporter, Reporter, TextReporter},
    scheduler::{Pacing, StopCondition},
};

/// Requests sent when neither a count nor a duration is given.
pub const DEFAULT_COUNT: u64 = 10;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Clone, Debug)]
#[clap(styles = STYLES)]
#[allow(missing_docs)]
pub struct ConsumerCli {
    /// Prefix to request data from. Repeat to run several prefixes in sequence
    #[clap(long, short = 'p', default_value = "/ndn/external/test")]
    pub prefix: Vec<Name>,

    /// Number of requests to send
    #[clap(long, short = 'n', visible_short_alias = 'c', conflicts_with = "duration")]
    pub count: Option<NonZeroU64>,

    /// How long to send requests for
    ///
    /// Examples: -d 10s, -d 5m
    #[clap(long, short = 'd')]
    pub duration: Option<humantime::Duration>,

    /// Delay between requests
    #[clap(long, short = 'i', default_value = "10us")]
    pub interval: humantime::Duration,

    #[cfg(feature = "rate_limit")]
    /// Send at this rate instead, in requests per second
    #[clap(long, short = 'r', conflicts_with = "interval")]
    pub rate: Option<NonZeroU32>,

    /// Length of a metrics window
    #[clap(long, default_value = "500ms")]
    pub window: humantime::Duration,

    /// Do not record windowed metrics
    #[clap(long)]
    pub no_windows: bool,

    /// Grace period for outstanding requests after sending stops
    #[clap(long, default_value = "5s")]
    pub drain: humantime::Duration,

    /// Interval between polls of the face
    #[clap(long, default_value = "10ms")]
    pub poll_interval: humantime::Duration,

    /// Output format for the report
    #[clap(short, long, value_enum, default_value_t = ReportFormat::Text, ignore_case = true)]
    pub output: ReportFormat,

    /// Output file path for the report
    ///
    /// When set, the report will be written to the specified file instead of stdout.
    #[clap(long, short = 'O')]
    pub output_file: Option<PathBuf>,

    /// Log more. Repeat for per-request detail (-vv)
    ///
    /// Caps what reaches the installed logger: -v logs run progress, -vv every
    /// request and outcome.
    #[clap(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}

impl ConsumerCli {
    /// The stop condition selected on the command line.
    pub fn stop(&self) -> StopCondition {
        match (self.count, self.duration) {
            (Some(n), _) => StopCondition::Count(n.get()),
            (None, Some(d)) => StopCondition::Duration(d.into()),
            (None, None) => StopCondition::Count(DEFAULT_COUNT),
        }
    }

    /// Request pacing selected on the command line.
    pub fn pacing(&self) -> Pacing {
        #[cfg(feature = "rate_limit")]
        if let Some(rate) = self.rate {
            return Pacing::Rate(rate);
        }
        Pacing::Delay(self.interval.into())
    }

    /// Run options for one prefix.
    pub fn consumer_opts(&self, prefix: Name) -> ConsumerOpts {
        ConsumerOpts::new(prefix, self.stop())
            .pacing(self.pacing())
            .poll_interval(self.poll_interval.into())
            .window((!self.no_windows).then(|| self.window.into()))
            .drain(self.drain.into())
    }
}

#[derive(Parser, Clone, Debug)]
#[clap(styles = STYLES)]
#[allow(missing_docs)]
pub struct ProducerCli {
    /// Prefix to serve data under
    #[clap(long, short = 'p', default_value = "/ndn/external/test")]
    pub prefix: Name,

    /// Number of requests to satisfy before stopping. 0 serves until interrupted
    #[clap(long, short = 'n', visible_short_alias = 'c', default_value_t = DEFAULT_COUNT)]
    pub count: u64,

    /// Size of each reply, in bytes
    #[clap(long, short = 's', default_value_t = 1000)]
    pub data_size: usize,

    /// Interval between polls of the face
    #[clap(long, default_value = "10ms")]
    pub poll_interval: humantime::Duration,

    /// Output format for the report
    #[clap(short, long, value_enum, default_value_t = ReportFormat::Text, ignore_case = true)]
    pub output: ReportFormat,

    /// Output file path for the report
    #[clap(long, short = 'O')]
    pub output_file: Option<PathBuf>,

    /// Log more. Repeat for per-request detail (-vv)
    ///
    /// Caps what reaches the installed logger: -v logs run progress, -vv every
    /// request and outcome.
    #[clap(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}

impl ProducerCli {
    /// Producer options selected on the command line.
    pub fn producer_opts(&self) -> ProducerOpts {
        ProducerOpts::new(self.prefix.clone(), self.data_size)
            .target((self.count > 0).then_some(self.count))
            .poll_interval(self.poll_interval.into())
    }
}

/// Log level for a `-v` count. `None` leaves the logger's own filter alone.
#[cfg(feature = "tracing")]
pub fn verbosity(verbose: u8) -> Option<log::LevelFilter> {
    match verbose {
        0 => None,
        1 => Some(log::LevelFilter::Info),
        _ => Some(log::LevelFilter::Trace),
    }
}

#[cfg(feature = "tracing")]
fn apply_verbosity(verbose: u8) {
    if let Some(level) = verbosity(verbose) {
        log::set_max_level(level);
    }
}

#[cfg(not(feature = "tracing"))]
fn apply_verbosity(_verbose: u8) {}

/// Report format.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ReportFormat {
    /// Report in plain text format. See [`TextReporter`].
    Text,

    /// Report in JSON format. See [`JsonReporter`].
    Json,
}

impl ReportFormat {
    fn reporter(self) -> &'static dyn Reporter {
        match self {
            ReportFormat::Text => &TextReporter,
            ReportFormat::Json => &JsonReporter,
        }
    }
}

fn output(path: Option<&PathBuf>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(stdout()),
    })
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            #[cfg(feature = "tracing")]
            log::info!("Interrupted, stopping");
            token.cancel();
        }
    });
    cancel
}

/// Run one consumer per prefix, in sequence, printing each report.
///
/// Every run opens a fresh face from `connector`. Ctrl-C stops the current
/// run (its report is still printed) and skips the remaining prefixes.
pub async fn run_consumer<C: Connect>(cli: ConsumerCli, connector: C) -> anyhow::Result<()> {
    apply_verbosity(cli.verbose);
    let cancel = cancel_on_ctrl_c();
    let reporter = cli.output.reporter();
    let mut out = output(cli.output_file.as_ref())?;

    for prefix in &cli.prefix {
        if cancel.is_cancelled() {
            break;
        }
        let face = connector.consumer().await?;
        let report = Consumer::new(face, cli.consumer_opts(prefix.clone()))
            .with_cancel(cancel.child_token())
            .run()
            .await?;
        reporter.print_consumer(&mut out, &report)?;
    }

    Ok(())
}

/// Serve the configured prefix and print the producer's report.
///
/// A registration failure is reported and then returned as an error.
pub async fn run_producer<C: Connect>(cli: ProducerCli, connector: C) -> anyhow::Result<()> {
    apply_verbosity(cli.verbose);
    let cancel = cancel_on_ctrl_c();
    let reporter = cli.output.reporter();
    let mut out = output(cli.output_file.as_ref())?;

    let face = connector.producer().await?;
    let report = Producer::new(face, cli.producer_opts()).with_cancel(cancel).run().await?;
    reporter.print_producer(&mut out, &report)?;

    if report.registration_failed() {
        bail!("registration of {} failed ({})", report.prefix, report.exit);
    }
    Ok(())
}
