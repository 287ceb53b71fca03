use clap::Parser;
use ndn_traffic::{
    Producer, ProducerOpts,
    cli::{ConsumerCli, run_consumer, verbosity},
    face::loopback::Loopback,
};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Run consumers against in-process producers.
///
/// Try: cargo run --example loopback -- -d 3s -i 1ms -v
#[derive(Parser, Clone)]
struct Opts {
    /// Size of each reply, in bytes
    #[clap(long, default_value_t = 1000)]
    data_size: usize,

    /// Lifetime of a request before it times out
    #[clap(long, default_value = "4s")]
    lifetime: humantime::Duration,

    #[command(flatten)]
    consumer: ConsumerCli,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    // RUST_LOG wins; otherwise -v picks the level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = verbosity(opts.consumer.verbose).unwrap_or(log::LevelFilter::Warn);
        EnvFilter::new(level.to_string().to_lowercase())
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let net = Loopback::new().with_lifetime(Duration::from(opts.lifetime));

    let stop = CancellationToken::new();
    let mut producers = Vec::new();
    for prefix in &opts.consumer.prefix {
        let producer = Producer::new(net.producer(), ProducerOpts::new(prefix.clone(), opts.data_size))
            .with_cancel(stop.clone());
        producers.push(tokio::spawn(producer.run()));
    }

    let res = run_consumer(opts.consumer, net).await;

    stop.cancel();
    for producer in producers {
        let report = producer.await??;
        tracing::info!(prefix = %report.prefix, satisfied = report.requests_satisfied, "producer stopped");
    }
    res
}
