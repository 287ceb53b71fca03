//! Traffic generation and measurement for named request/response networks.
//!
//! A [`Consumer`] expresses uniquely named requests under a prefix at a
//! controlled pace, collects their outcomes (data, timeout or nack) as they
//! arrive, and reports throughput, loss, time to first byte and round-trip
//! latency, both per window and for the whole run. A [`Producer`] registers a
//! prefix and answers requests with fixed-size content until it has
//! satisfied a target count.
//!
//! The transport is abstracted behind the traits in [`face`]. An in-process
//! [`Loopback`](face::loopback::Loopback) network is included for tests and
//! demos.
//!
//! ## Features
//!
//! - **Count or duration runs**: stop after N requests or after a wall-clock deadline.
//! - **Exact accounting**: every request reaches at most one counted outcome.
//! - **Windowed metrics**: per-window rates alongside the run summary.
//! - **Graceful shutdown**: in-flight requests drain for a bounded grace period.
//!
//! ## Example
//!
//! ```no_run
//! use ndn_traffic::{
//!     Consumer, ConsumerOpts, Name, Producer, ProducerOpts, StopCondition,
//!     face::loopback::Loopback,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let net = Loopback::new();
//!     let producer = Producer::new(net.producer(), ProducerOpts::new(Name::new("/test"), 1000).target(Some(10)));
//!     let serving = tokio::spawn(producer.run());
//!
//!     let opts = ConsumerOpts::new(Name::new("/test"), StopCondition::Count(10));
//!     let report = Consumer::new(net.consumer(), opts).run().await?;
//!     println!("loss: {:.2}%", report.summary.loss_percent);
//!
//!     serving.await??;
//!     Ok(())
//! }
//! ```

mod util;

pub mod cli;
pub mod clock;
pub mod collector;
pub mod consumer;
pub mod error;
pub mod face;
pub mod histogram;
pub mod name;
pub mod producer;
pub mod report;
pub mod reporter;
pub mod scheduler;
pub mod stats;

pub use crate::{
    consumer::{Consumer, ConsumerOpts, ConsumerState},
    error::{FaceError, RunError},
    name::{Name, NameSequencer},
    producer::{Producer, ProducerOpts, ProducerState},
    report::{ConsumerReport, ProducerExit, ProducerReport},
    scheduler::{Pacing, StopCondition},
    stats::{MetricsSnapshot, RunCounters},
};
