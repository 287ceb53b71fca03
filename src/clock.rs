//! The run clock.
//!
//! Every timestamp recorded during a run is an offset from the run start.
//! [`Clock`] captures that start and converts instants into offsets, and
//! [`Ticker`] produces the fixed cadence used for metric windows.
//!
//! All instants come from [`tokio::time`], so runs can be driven on a paused
//! runtime in tests.
//!
//! # Example
//!
//! ```ignore
//! let clock = Clock::start_now();
//! let mut ticker = clock.ticker(Duration::from_millis(500));
//! ticker.tick().await; // ~500ms after start
//! assert!(clock.elapsed() >= Duration::from_millis(500));
//! ```

use tokio::time::{self, Duration, Instant};

/// Start instant of a run and conversions relative to it.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    /// Creates a clock whose run started at the given instant.
    pub fn start_at(start: Instant) -> Self {
        Self { start }
    }

    /// Creates a clock whose run starts now.
    pub fn start_now() -> Self {
        Self::start_at(Instant::now())
    }

    /// The instant the run started.
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Time elapsed since the run started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Offset of `at` from the run start, saturating at zero.
    pub fn offset(&self, at: Instant) -> Duration {
        at.saturating_duration_since(self.start)
    }

    /// The instant at the given offset from the run start.
    pub fn at(&self, offset: Duration) -> Instant {
        self.start + offset
    }

    /// Sleeps until the given offset from the run start.
    ///
    /// Returns immediately if that offset has already passed.
    pub async fn sleep_until(&self, offset: Duration) {
        time::sleep_until(self.at(offset)).await;
    }

    /// Creates a [`Ticker`] that ticks every `period`, first at `period`.
    pub fn ticker(&self, period: Duration) -> Ticker {
        Ticker::new(*self, period)
    }
}

#[cfg(feature = "rate_limit")]
impl governor::clock::Clock for Clock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        self.start.into_std() + self.elapsed()
    }
}
#[cfg(feature = "rate_limit")]
impl governor::clock::ReasonablyRealtime for Clock {}

/// Produces ticks at fixed offsets from the run start.
///
/// Ticks are scheduled at `period`, `2 * period`, ... When the consumer of
/// the ticker falls behind, missed ticks are skipped rather than replayed, so
/// every window covers at least one full period.
///
/// [`tick`](Self::tick) is cancel safe: dropping the future before it
/// completes leaves the schedule untouched.
#[derive(Debug, Clone)]
pub struct Ticker {
    clock: Clock,
    period: Duration,
    next_tick: Duration,
}

impl Ticker {
    /// Creates a new ticker with the given clock and period.
    pub fn new(clock: Clock, period: Duration) -> Self {
        Self { clock, period, next_tick: period }
    }

    /// Waits for the next tick and returns the current offset from the run
    /// start, which is later than the scheduled tick when the caller fell
    /// behind.
    pub async fn tick(&mut self) -> Duration {
        self.clock.sleep_until(self.next_tick).await;
        let now = self.clock.elapsed();
        self.next_tick += self.period;
        if self.next_tick <= now {
            self.next_tick = now + self.period;
        }
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticker_follows_schedule() {
        let clock = Clock::start_now();
        let mut ticker = clock.ticker(Duration::from_millis(500));

        assert!(ticker.tick().await >= Duration::from_millis(500));
        assert!(ticker.tick().await >= Duration::from_millis(1000));
        assert!(clock.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_skips_missed_ticks() {
        let clock = Clock::start_now();
        let mut ticker = clock.ticker(Duration::from_millis(100));

        time::sleep(Duration::from_millis(350)).await;
        // the overdue tick fires immediately at the current time, the ones
        // behind it are dropped
        let late = ticker.tick().await;
        assert!(late >= Duration::from_millis(350), "late tick at {late:?}");
        let next = ticker.tick().await;
        assert!(next >= Duration::from_millis(450), "next tick at {next:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn offsets_are_relative_to_start() {
        let clock = Clock::start_now();
        time::sleep(Duration::from_secs(2)).await;
        let now = Instant::now();
        assert_eq!(clock.offset(now), clock.elapsed());
        assert_eq!(clock.offset(clock.start() - Duration::from_secs(1)), Duration::ZERO);
        assert_eq!(clock.at(Duration::from_secs(2)), clock.start() + Duration::from_secs(2));
    }
}
