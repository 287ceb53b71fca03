//! The producer orchestrator.
//!
//! A producer registers one prefix and answers every request under it with
//! the same content until it has satisfied its target, moving through
//! `Registered → Serving → Stopped`. A failed registration is fatal: the
//! producer stops without serving anything.
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::{
    select,
    sync::watch,
    time::{Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    consumer::DEFAULT_POLL_INTERVAL,
    error::{FaceError, Result, RunError},
    face::{ProducerEvent, ProducerFace},
    name::Name,
    report::{ProducerExit, ProducerReport},
};

/// Freshness period attached to every reply.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(3600);

/// Options for a producer.
#[derive(Clone, Debug)]
pub struct ProducerOpts {
    /// Prefix to register.
    pub prefix: Name,

    /// Content of every reply.
    pub content: Bytes,

    /// Number of requests to satisfy before stopping. `None` serves until
    /// cancelled.
    pub target: Option<u64>,

    /// Interval between face polls.
    pub poll_interval: Duration,

    /// How long replies stay fresh in caches.
    pub freshness: Duration,
}

impl ProducerOpts {
    /// Options replying with `size` zero bytes.
    pub fn new(prefix: Name, size: usize) -> Self {
        Self {
            prefix,
            content: Bytes::from(vec![0; size]),
            target: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            freshness: DEFAULT_FRESHNESS,
        }
    }

    pub fn content(mut self, content: Bytes) -> Self {
        self.content = content;
        self
    }

    pub fn target(mut self, target: Option<u64>) -> Self {
        self.target = target;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Check the options are usable.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(RunError::InvalidConfig("poll interval must be positive".into()));
        }
        if self.target == Some(0) {
            return Err(RunError::InvalidConfig("target must be positive".into()));
        }
        Ok(())
    }
}

/// Lifecycle of a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ProducerState {
    Registered,
    Serving,
    Stopped,
}

#[derive(Default)]
struct Served {
    received: u64,
    satisfied: u64,
    ignored: u64,
    first: Option<Instant>,
}

/// Serves a prefix on a face.
pub struct Producer<F> {
    face: F,
    opts: ProducerOpts,
    cancel: CancellationToken,
    state: watch::Sender<ProducerState>,
}

impl<F> Producer<F>
where
    F: ProducerFace,
{
    /// Create a producer owning `face`.
    pub fn new(face: F, opts: ProducerOpts) -> Self {
        let (state, _) = watch::channel(ProducerState::Registered);
        Self { face, opts, cancel: CancellationToken::new(), state }
    }

    /// Stop serving when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Watch the producer's state.
    pub fn state(&self) -> watch::Receiver<ProducerState> {
        self.state.subscribe()
    }

    /// Register the prefix and serve until the target is reached, the
    /// registration fails or the producer is cancelled.
    ///
    /// A registration failure is reported in the returned report, not as an
    /// error. The face is shut down on every exit path.
    pub async fn run(mut self) -> Result<ProducerReport> {
        let res = match self.opts.validate() {
            Ok(()) => self.serve().await,
            Err(e) => Err(e),
        };
        self.face.shutdown();
        self.set_state(ProducerState::Stopped);
        res
    }

    async fn serve(&mut self) -> Result<ProducerReport> {
        let started_at = Utc::now();
        let mut served = Served::default();

        #[cfg(feature = "tracing")]
        log::info!("Registering prefix {}", self.opts.prefix);
        if let Err(e) = self.face.register_prefix(&self.opts.prefix) {
            #[cfg(feature = "tracing")]
            log::error!("Registration of {} failed: {e}", self.opts.prefix);
            let exit = ProducerExit::RegistrationFailed { reason: e.to_string() };
            return Ok(self.report(started_at, exit, served, None));
        }

        let mut interval = tokio::time::interval(self.opts.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events = Vec::new();

        let exit = loop {
            select! {
                biased;
                _ = self.cancel.cancelled() => break ProducerExit::Cancelled,
                _ = interval.tick() => (),
            }

            match self.face.process_events(&mut events) {
                Ok(()) => (),
                Err(FaceError::Closed) => break ProducerExit::FaceClosed,
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    log::warn!("Failed to process face events: {_e}");
                }
            }

            if let Some(exit) = self.dispatch(&mut events, &mut served) {
                break exit;
            }
        };

        let elapsed = served.first.map(|first| first.elapsed());
        #[cfg(feature = "tracing")]
        log::info!(
            "Producer for {} stopped ({exit}): {} received, {} satisfied",
            self.opts.prefix,
            served.received,
            served.satisfied
        );
        Ok(self.report(started_at, exit, served, elapsed))
    }

    /// Handle one batch of events. Returns the exit reason once the producer
    /// must stop; the rest of the batch is then ignored.
    fn dispatch(&mut self, events: &mut Vec<ProducerEvent>, served: &mut Served) -> Option<ProducerExit> {
        let mut exit = None;
        for event in events.drain(..) {
            if exit.is_some() {
                if let ProducerEvent::Interest { name: _name } = event {
                    #[cfg(feature = "tracing")]
                    log::debug!("Ignoring {_name}: producer stopped");
                    served.ignored += 1;
                }
                continue;
            }

            match event {
                ProducerEvent::Registered { prefix: _prefix } => {
                    #[cfg(feature = "tracing")]
                    log::info!("Listening for requests under {_prefix}");
                    self.set_state(ProducerState::Serving);
                }
                ProducerEvent::RegisterFailed { prefix: _prefix, reason } => {
                    #[cfg(feature = "tracing")]
                    log::error!("Registration of {_prefix} failed: {reason}");
                    exit = Some(ProducerExit::RegistrationFailed { reason });
                }
                ProducerEvent::Interest { name } => {
                    // an interest routed to us confirms the registration
                    if *self.state.borrow() == ProducerState::Registered {
                        self.set_state(ProducerState::Serving);
                    }
                    served.received += 1;
                    served.first.get_or_insert_with(Instant::now);
                    match self.face.put_data(&name, self.opts.content.clone(), self.opts.freshness) {
                        Ok(()) => {
                            served.satisfied += 1;
                            #[cfg(feature = "tracing")]
                            log::trace!("Replied to {name}");
                        }
                        Err(_e) => {
                            #[cfg(feature = "tracing")]
                            log::warn!("Failed to reply to {name}: {_e}");
                        }
                    }
                    if self.opts.target.is_some_and(|t| served.satisfied >= t) {
                        exit = Some(ProducerExit::TargetReached);
                    }
                }
            }
        }
        exit
    }

    fn report(
        &self,
        started_at: DateTime<Utc>,
        exit: ProducerExit,
        served: Served,
        elapsed: Option<Duration>,
    ) -> ProducerReport {
        let content_size = self.opts.content.len() as u64;
        ProducerReport {
            prefix: self.opts.prefix.clone(),
            started_at,
            exit,
            requests_received: served.received,
            requests_satisfied: served.satisfied,
            bytes_sent: served.satisfied * content_size,
            content_size,
            elapsed,
            ignored: served.ignored,
        }
    }

    fn set_state(&self, state: ProducerState) {
        let prev = self.state.send_replace(state);
        if prev != state {
            #[cfg(feature = "tracing")]
            log::info!("Producer {}: {prev} -> {state}", self.opts.prefix);
        }
    }
}
