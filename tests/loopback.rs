//! End-to-end runs of consumers against producers over the loopback network.
use clap::Parser;
use ndn_traffic::{
    Consumer, ConsumerOpts, MetricsSnapshot, Name, Pacing, Producer, ProducerExit, ProducerOpts, ProducerReport,
    ProducerState, RunError, StopCondition,
    cli::{ConsumerCli, ProducerCli, run_consumer, run_producer},
    face::{ProducerFace, loopback::Loopback},
};
use tokio::{task::JoinHandle, time::Duration};

async fn serve(net: &Loopback, prefix: &str, target: Option<u64>) -> JoinHandle<Result<ProducerReport, RunError>> {
    let producer = Producer::new(net.producer(), ProducerOpts::new(Name::new(prefix), 1000).target(target));
    let mut state = producer.state();
    let handle = tokio::spawn(producer.run());
    state.wait_for(|s| *s == ProducerState::Serving).await.unwrap();
    handle
}

fn count_opts(prefix: &str, n: u64, delay: Duration) -> ConsumerOpts {
    ConsumerOpts::new(Name::new(prefix), StopCondition::Count(n))
        .pacing(Pacing::Delay(delay))
        .drain(Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn all_requests_delivered() {
    let net = Loopback::new();
    let producer = serve(&net, "/test", Some(10)).await;

    let report = Consumer::new(net.consumer(), count_opts("/test", 10, Duration::from_millis(1)))
        .run()
        .await
        .unwrap();
    let c = report.counters.counter;
    assert_eq!(c.sent, 10);
    assert_eq!(c.delivered, 10);
    assert_eq!(c.bytes, 10_000);
    assert_eq!(report.summary.loss_percent, 0.0);
    assert_eq!(report.summary.total_goodput_kb, 10.0);
    assert!(report.summary.time_to_first_byte_ms.is_some());

    let served = producer.await.unwrap().unwrap();
    assert_eq!(served.exit, ProducerExit::TargetReached);
    assert_eq!(served.requests_satisfied, 10);
    assert_eq!(served.bytes_sent, 10_000);
}

#[tokio::test(start_paused = true)]
async fn unrouted_requests_count_as_loss() {
    let net = Loopback::new();
    // the producer withdraws its route after 7 replies, so the last 3 are nacked
    let producer = serve(&net, "/test", Some(7)).await;

    let report = Consumer::new(net.consumer(), count_opts("/test", 10, Duration::from_millis(100)))
        .run()
        .await
        .unwrap();
    let c = report.counters.counter;
    assert_eq!((c.delivered, c.timeouts, c.rejections), (7, 0, 3));
    assert!((report.summary.loss_percent - 30.0).abs() < 1e-9);
    assert_eq!(producer.await.unwrap().unwrap().requests_satisfied, 7);
}

#[tokio::test(start_paused = true)]
async fn unanswered_requests_time_out() {
    let net = Loopback::new().with_lifetime(Duration::from_millis(200));
    let mut idle = net.producer();
    idle.register_prefix(&Name::new("/idle")).unwrap();

    let report = Consumer::new(net.consumer(), count_opts("/idle", 3, Duration::from_millis(10)))
        .run()
        .await
        .unwrap();
    let c = report.counters.counter;
    assert_eq!(c.timeouts, 3);
    assert_eq!(c.delivered, 0);
    assert_eq!(report.summary.loss_percent, 100.0);
    assert_eq!(report.summary.time_to_first_byte_ms, None);
    assert_eq!(report.abandoned, 0);
}

#[tokio::test(start_paused = true)]
async fn duration_run_follows_interval() {
    let net = Loopback::new();
    let _producer = serve(&net, "/test", None).await;

    let opts = ConsumerOpts::new(Name::new("/test"), StopCondition::Duration(Duration::from_secs(2)))
        .pacing(Pacing::Delay(Duration::from_millis(100)));
    let report = Consumer::new(net.consumer(), opts).run().await.unwrap();

    let c = report.counters.counter;
    assert!((19..=21).contains(&c.sent), "sent {}", c.sent);
    assert_eq!(c.delivered, c.sent);
    assert!(!report.windows.is_empty());
}

#[tokio::test(start_paused = true)]
async fn producer_stops_at_target() {
    let net = Loopback::new();
    let producer = serve(&net, "/test", Some(5)).await;

    let report = Consumer::new(net.consumer(), count_opts("/test", 6, Duration::from_millis(100)))
        .run()
        .await
        .unwrap();
    assert_eq!(report.counters.counter.delivered, 5);
    assert_eq!(report.counters.counter.rejections, 1);

    let served = producer.await.unwrap().unwrap();
    assert_eq!(served.requests_received, 5);
    assert_eq!(served.requests_satisfied, 5);
    assert_eq!(net.routes(), 0);
}

#[tokio::test(start_paused = true)]
async fn registration_failure_stops_producer() {
    let net = Loopback::new();
    let _first = serve(&net, "/test", None).await;

    let second = Producer::new(net.producer(), ProducerOpts::new(Name::new("/test"), 1000).target(Some(5)));
    let mut state = second.state();
    let report = second.run().await.unwrap();

    assert!(report.registration_failed());
    assert_eq!(report.requests_satisfied, 0);
    assert_eq!(*state.borrow_and_update(), ProducerState::Stopped);
    assert_eq!(net.routes(), 1);
}

#[tokio::test(start_paused = true)]
async fn summary_is_reproducible() {
    let net = Loopback::new();
    let _producer = serve(&net, "/test", None).await;

    let report = Consumer::new(net.consumer(), count_opts("/test", 20, Duration::from_millis(5)))
        .run()
        .await
        .unwrap();
    let a = MetricsSnapshot::summary(&report.counters, Duration::from_secs(100));
    let b = MetricsSnapshot::summary(&report.counters, Duration::from_secs(200));
    assert_eq!(a, b);
    assert_eq!(a, report.summary);
}

#[tokio::test(start_paused = true)]
async fn cli_runs_each_prefix() {
    let net = Loopback::new();
    let a = serve(&net, "/a", Some(5)).await;
    let b = serve(&net, "/b", Some(5)).await;

    let path = std::env::temp_dir().join(format!("ndn-traffic-cli-{}.json", std::process::id()));
    let cli = ConsumerCli::parse_from([
        "consumer",
        "-p",
        "/a",
        "-p",
        "/b",
        "-n",
        "5",
        "-i",
        "1ms",
        "-o",
        "json",
        "-O",
        path.to_str().unwrap(),
    ]);
    run_consumer(cli, net.clone()).await.unwrap();

    let out = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    let reports: Vec<serde_json::Value> =
        serde_json::Deserializer::from_slice(&out).into_iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["prefix"], "/a");
    assert_eq!(reports[1]["prefix"], "/b");
    assert!(reports.iter().all(|r| r["requests"]["delivered"] == 5));

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn cli_producer_fails_on_taken_prefix() {
    let net = Loopback::new();
    let _first = serve(&net, "/taken", None).await;

    let path = std::env::temp_dir().join(format!("ndn-traffic-producer-{}.txt", std::process::id()));
    let cli = ProducerCli::parse_from(["producer", "-p", "/taken", "-O", path.to_str().unwrap()]);
    let res = run_producer(cli, net).await;
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(res.is_err());
    assert!(text.contains("registration_failed"));
}
