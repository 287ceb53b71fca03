//! The consumer orchestrator.
//!
//! A run moves through `Idle → Running → Draining → Stopped`. Three tasks
//! cooperate while it is live:
//!
//! - the [`RequestScheduler`] expresses requests on the face,
//! - the pump polls the face for outcomes on a short fixed interval,
//! - the run loop owns the [`ResponseCollector`] and the
//!   [`MetricsAggregator`], and is the only place counters change.
//!
//! The scheduler and the pump feed a single bounded channel, so the loop sees
//! each request before any outcome for it.
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::{
    select,
    sync::{mpsc, watch},
    time::{Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, Ticker},
    collector::{ResponseCollector, RunEvent},
    error::{FaceError, Result, RunError},
    face::ConsumerFace,
    name::Name,
    report::ConsumerReport,
    scheduler::{Pacing, RequestScheduler, StopCondition},
    stats::MetricsAggregator,
};

/// Default interval between face polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Default metric window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);
/// Default grace period for in-flight requests after sending stops.
pub const DEFAULT_DRAIN: Duration = Duration::from_secs(5);

/// Options for one consumer run.
#[derive(Clone, Debug)]
pub struct ConsumerOpts {
    /// Prefix requests are named under.
    pub prefix: Name,

    /// When to stop sending.
    pub stop: StopCondition,

    /// Spacing between requests.
    pub pacing: Pacing,

    /// Interval between face polls.
    pub poll_interval: Duration,

    /// Length of a metric window. `None` disables the window series.
    pub window: Option<Duration>,

    /// Grace period for in-flight requests once sending has stopped.
    pub drain: Duration,

    /// Capacity of the run's event channel.
    pub channel_capacity: usize,
}

impl ConsumerOpts {
    /// Options with defaults for everything but the prefix and stop condition.
    pub fn new(prefix: Name, stop: StopCondition) -> Self {
        Self {
            prefix,
            stop,
            pacing: Pacing::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            window: Some(DEFAULT_WINDOW),
            drain: DEFAULT_DRAIN,
            channel_capacity: 1024,
        }
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn window(mut self, window: Option<Duration>) -> Self {
        self.window = window;
        self
    }

    pub fn drain(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }

    /// Check the options are usable.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(RunError::InvalidConfig("poll interval must be positive".into()));
        }
        if self.window.is_some_and(|w| w.is_zero()) {
            return Err(RunError::InvalidConfig("window must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(RunError::InvalidConfig("channel capacity must be positive".into()));
        }
        Ok(())
    }
}

/// Lifecycle of a consumer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConsumerState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Drives one run against a face and returns its report.
pub struct Consumer<F> {
    face: Arc<Mutex<F>>,
    opts: ConsumerOpts,
    cancel: CancellationToken,
    state: watch::Sender<ConsumerState>,
}

impl<F> Consumer<F>
where
    F: ConsumerFace,
{
    /// Create a consumer owning `face`.
    pub fn new(face: F, opts: ConsumerOpts) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self { face: Arc::new(Mutex::new(face)), opts, cancel: CancellationToken::new(), state }
    }

    /// Stop sending when `cancel` fires. In-flight requests still drain.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Watch the run's state.
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Execute the run.
    ///
    /// A run always produces a report, however many requests failed. Errors
    /// are returned only for invalid options or a broken run. The face is
    /// shut down on every exit path.
    pub async fn run(self) -> Result<ConsumerReport> {
        if let Err(e) = self.opts.validate() {
            self.face.lock().shutdown();
            self.set_state(ConsumerState::Stopped);
            return Err(e);
        }

        let res = self.drive().await;
        self.face.lock().shutdown();
        self.set_state(ConsumerState::Stopped);
        res
    }

    async fn drive(&self) -> Result<ConsumerReport> {
        let started_at = Utc::now();
        let clock = Clock::start_now();
        // stops the scheduler and the pump on every exit from this function
        let tasks = CancellationToken::new();
        let _guard = tasks.clone().drop_guard();
        // a user cancel only stops sending; the pump keeps running to drain
        let sending = tasks.child_token();

        let (tx, mut rx) = mpsc::channel(self.opts.channel_capacity);
        let scheduler = RequestScheduler::new(
            self.face.clone(),
            &self.opts.prefix,
            self.opts.stop,
            self.opts.pacing,
            clock,
            tx.clone(),
            sending.clone(),
        );
        self.set_state(ConsumerState::Running);
        #[cfg(feature = "tracing")]
        log::info!("Sending {} under {}", self.opts.stop, self.opts.prefix);

        let mut scheduler = tokio::spawn(scheduler.run());
        let pump = tokio::spawn(pump(self.face.clone(), self.opts.poll_interval, tx, tasks.clone()));

        let mut collector = ResponseCollector::new(clock, self.opts.stop.count());
        let mut aggregator = MetricsAggregator::new();
        let mut ticker = self.opts.window.map(|w| clock.ticker(w));

        let mut scheduled: Option<u64> = None;
        let mut drain_started: Option<Duration> = None;
        let mut drain_deadline: Option<Instant> = None;
        let mut events_closed = false;

        loop {
            select! {
                biased;
                res = &mut scheduler, if scheduled.is_none() => {
                    let sent = res??;
                    scheduled = Some(sent);
                    drain_started = Some(clock.elapsed());
                    drain_deadline = Some(Instant::now() + self.opts.drain);
                    self.set_state(ConsumerState::Draining);
                    #[cfg(feature = "tracing")]
                    log::info!("Sent {sent} requests, waiting for {} outstanding", collector.tracker().pending());
                }
                _ = self.cancel.cancelled(), if scheduled.is_none() && !sending.is_cancelled() => {
                    #[cfg(feature = "tracing")]
                    log::info!("Run under {} cancelled, stopping", self.opts.prefix);
                    sending.cancel();
                }
                ev = rx.recv(), if !events_closed => match ev {
                    Some(ev) => {
                        if collector.handle(ev)? {
                            #[cfg(feature = "tracing")]
                            log::info!("All requests resolved");
                        }
                    }
                    None => events_closed = true,
                },
                now = next_window(&mut ticker) => {
                    let _w = aggregator.record(collector.counters(), now);
                    #[cfg(feature = "tracing")]
                    log::debug!("Window at {:.3}s: {} sent, {:.2}% loss", _w.elapsed_secs, _w.requests_sent, _w.loss_percent);
                }
                _ = sleep_until(drain_deadline) => {
                    #[cfg(feature = "tracing")]
                    log::info!("Drain grace expired with {} requests outstanding", collector.tracker().pending());
                    break;
                }
            }

            if let Some(sent) = scheduled {
                let all_seen = events_closed || collector.counters().counter.sent >= sent;
                if all_seen && collector.tracker().pending() == 0 {
                    break;
                }
            }
        }

        tasks.cancel();
        // wakes a pump blocked on a full channel
        rx.close();
        pump.await??;

        let drain_started = drain_started.unwrap_or_else(|| clock.elapsed());
        let end = drain_started.max(collector.last_outcome());
        let abandoned = collector.tracker().pending();
        let summary_window = aggregator.summarize(collector.counters(), end);
        let (counters, hist, discarded) = collector.finish(end);

        #[cfg(feature = "tracing")]
        log::info!(
            "Run under {} finished: {} sent, {} delivered, {:.2}% loss",
            self.opts.prefix,
            counters.counter.sent,
            counters.counter.delivered,
            summary_window.loss_percent
        );

        Ok(ConsumerReport {
            prefix: self.opts.prefix.clone(),
            started_at,
            stop: self.opts.stop,
            elapsed: clock.elapsed(),
            counters,
            summary: summary_window,
            windows: aggregator.into_windows(),
            hist,
            abandoned,
            discarded,
            cancelled: self.cancel.is_cancelled(),
        })
    }

    fn set_state(&self, state: ConsumerState) {
        let prev = self.state.send_replace(state);
        if prev != state {
            #[cfg(feature = "tracing")]
            log::info!("Consumer {}: {prev} -> {state}", self.opts.prefix);
        }
    }
}

/// Polls the face and forwards its notifications to the run loop.
async fn pump<F: ConsumerFace>(
    face: Arc<Mutex<F>>,
    interval: Duration,
    tx: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut batch = Vec::new();

    loop {
        select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => (),
        }

        let res = face.lock().process_events(&mut batch);
        let at = Instant::now();
        match res {
            Ok(()) => (),
            Err(FaceError::Closed) => {
                #[cfg(feature = "tracing")]
                log::warn!("Face closed, no more outcomes will be observed");
                break;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                log::warn!("Failed to process face events: {_e}");
            }
        }

        for event in batch.drain(..) {
            select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                res = tx.send(RunEvent::Notified { event, at }) => {
                    if res.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
    Ok(())
}

async fn next_window(ticker: &mut Option<Ticker>) -> Duration {
    match ticker {
        Some(t) => t.tick().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
