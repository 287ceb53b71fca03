//! Rate-controlled request emission.
use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::{
    select,
    sync::mpsc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

cfg_if::cfg_if! {
    if #[cfg(feature = "rate_limit")] {
        use std::num::NonZeroU32;
        use governor::{Quota, RateLimiter};
        use nonzero_ext::nonzero;
    }
}

use crate::{
    clock::Clock,
    collector::RunEvent,
    error::{Result, RunError},
    face::{ConsumerFace, FaceEvent, NackReason},
    name::{Name, NameSequencer},
};

/// When a consumer run stops sending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopCondition {
    /// Send until this much time has passed since the run started.
    Duration(Duration),
    /// Send exactly this many requests.
    Count(u64),
}

impl StopCondition {
    /// The request count, in count mode.
    pub fn count(&self) -> Option<u64> {
        match *self {
            StopCondition::Count(n) => Some(n),
            StopCondition::Duration(_) => None,
        }
    }

    /// The run length, in duration mode.
    pub fn duration(&self) -> Option<Duration> {
        match *self {
            StopCondition::Duration(d) => Some(d),
            StopCondition::Count(_) => None,
        }
    }
}

impl fmt::Display for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCondition::Duration(d) => write!(f, "for {}", humantime::format_duration(*d)),
            StopCondition::Count(n) => write!(f, "{n} requests"),
        }
    }
}

/// How requests are spaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pacing {
    /// Wait this long after each request. Zero sends as fast as possible
    /// while still yielding to the other tasks of the run.
    Delay(Duration),
    #[cfg(feature = "rate_limit")]
    /// Token bucket limited to this many requests per second.
    Rate(NonZeroU32),
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::Delay(Duration::from_micros(10))
    }
}

/// Emits `prefix/0`, `prefix/1`, ... on a face until the stop condition.
///
/// Every request is announced on the run's event channel *before* it is
/// expressed, so its outcome can never overtake it.
pub(crate) struct RequestScheduler<F> {
    face: Arc<Mutex<F>>,
    names: NameSequencer,
    stop: StopCondition,
    pacing: Pacing,
    clock: Clock,
    events: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
}

impl<F> RequestScheduler<F>
where
    F: ConsumerFace,
{
    pub(crate) fn new(
        face: Arc<Mutex<F>>,
        prefix: &Name,
        stop: StopCondition,
        pacing: Pacing,
        clock: Clock,
        events: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { face, names: NameSequencer::new(prefix), stop, pacing, clock, events, cancel }
    }

    /// Send until the stop condition is met or the run is cancelled.
    ///
    /// Returns the number of requests sent.
    pub(crate) async fn run(mut self) -> Result<u64> {
        #[cfg(feature = "rate_limit")]
        let bucket = match self.pacing {
            Pacing::Rate(r) => {
                let quota = Quota::per_second(r).allow_burst(nonzero!(1u32));
                Some(RateLimiter::direct_with_clock(quota, self.clock))
            }
            Pacing::Delay(_) => None,
        };

        self.names.reset();
        let mut sent = 0;
        loop {
            if self.exhausted(sent) {
                break;
            }

            #[cfg(feature = "rate_limit")]
            if let Some(bucket) = &bucket {
                select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = self.deadline() => break,
                    _ = bucket.until_ready() => (),
                }
            }

            let permit = select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = self.events.reserve() => permit.map_err(|_| RunError::EventChannelClosed)?,
            };
            let Some(name) = self.names.next() else {
                break;
            };
            permit.send(RunEvent::Sent { name: name.clone(), at: Instant::now() });

            let res = self.face.lock().express_interest(&name);
            if let Err(_e) = res {
                #[cfg(feature = "tracing")]
                log::warn!("Failed to express {name}: {_e}");
                let event = FaceEvent::Nack { name, reason: NackReason::Unspecified };
                self.events
                    .send(RunEvent::Notified { event, at: Instant::now() })
                    .await
                    .map_err(|_| RunError::EventChannelClosed)?;
            } else {
                #[cfg(feature = "tracing")]
                log::trace!("Sent request {name}");
            }
            sent += 1;

            if self.exhausted(sent) {
                break;
            }
            if let Pacing::Delay(delay) = self.pacing {
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = self.deadline() => break,
                        _ = tokio::time::sleep(delay) => (),
                    }
                }
            }
        }

        #[cfg(feature = "tracing")]
        log::debug!("Scheduler finished after {sent} requests");
        Ok(sent)
    }

    fn exhausted(&self, sent: u64) -> bool {
        match self.stop {
            StopCondition::Count(n) => sent >= n,
            StopCondition::Duration(d) => self.clock.elapsed() >= d,
        }
    }

    /// Resolves at the duration-mode deadline; never in count mode.
    async fn deadline(&self) {
        match self.stop {
            StopCondition::Duration(d) => self.clock.sleep_until(d).await,
            StopCondition::Count(_) => std::future::pending().await,
        }
    }
}
