//! The transport boundary.
//!
//! A face is the engine's only view of the network. The consumer side
//! expresses named requests and later learns their outcome by polling; the
//! producer side registers a prefix, is told about matching requests and
//! answers them. Both are poll driven: nothing happens on a face until
//! `process_events` is called, which keeps all state changes on the task
//! that owns the run.
//!
//! Packet encoding, signing and forwarding live behind these traits and are
//! not part of this crate. [`loopback`] provides an in-process implementation.

pub mod loopback;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Duration;

use crate::{error::FaceError, name::Name};

/// Notification about a request previously expressed on a [`ConsumerFace`].
///
/// Each expressed name gets at most one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceEvent {
    /// A response arrived carrying `payload_len` bytes of content.
    Data { name: Name, payload_len: u64 },
    /// The request's lifetime expired without a response.
    Timeout { name: Name },
    /// The network refused the request.
    Nack { name: Name, reason: NackReason },
}

impl FaceEvent {
    /// The request name the event refers to.
    pub fn name(&self) -> &Name {
        match self {
            FaceEvent::Data { name, .. } | FaceEvent::Timeout { name } | FaceEvent::Nack { name, .. } => name,
        }
    }
}

/// Reason carried by a network nack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum NackReason {
    NoRoute,
    Congestion,
    Duplicate,
    Unspecified,
}

/// Notification on a [`ProducerFace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerEvent {
    /// The prefix registration was accepted by the forwarder.
    Registered { prefix: Name },
    /// The prefix registration was refused.
    RegisterFailed { prefix: Name, reason: String },
    /// A request matching the registered prefix arrived.
    Interest { name: Name },
}

/// Client side of a transport.
pub trait ConsumerFace: Send + 'static {
    /// Express a request. Fire and forget: the outcome arrives later through
    /// [`process_events`](Self::process_events).
    fn express_interest(&mut self, name: &Name) -> Result<(), FaceError>;

    /// Dispatch pending notifications into `events`.
    ///
    /// Must be called periodically for outcomes to be observed.
    fn process_events(&mut self, events: &mut Vec<FaceEvent>) -> Result<(), FaceError>;

    /// Release the face. Further calls fail with [`FaceError::Closed`].
    fn shutdown(&mut self);
}

/// Server side of a transport.
pub trait ProducerFace: Send + 'static {
    /// Ask the forwarder to route `prefix` to this face.
    ///
    /// The result may be reported immediately as an error or later through a
    /// [`ProducerEvent`]. A face that never reports success is taken as
    /// registered once the first interest arrives.
    fn register_prefix(&mut self, prefix: &Name) -> Result<(), FaceError>;

    /// Dispatch pending notifications into `events`.
    fn process_events(&mut self, events: &mut Vec<ProducerEvent>) -> Result<(), FaceError>;

    /// Answer a request with content that stays fresh for `freshness`.
    fn put_data(&mut self, name: &Name, content: Bytes, freshness: Duration) -> Result<(), FaceError>;

    /// Release the face and withdraw its registrations.
    fn shutdown(&mut self);
}

/// Opens faces on a network.
///
/// Multi-prefix runs open one fresh face per run.
#[async_trait]
pub trait Connect: Send + Sync {
    /// Client face type.
    type Consumer: ConsumerFace;
    /// Server face type.
    type Producer: ProducerFace;

    /// Open a new consumer face.
    async fn consumer(&self) -> Result<Self::Consumer, FaceError>;

    /// Open a new producer face.
    async fn producer(&self) -> Result<Self::Producer, FaceError>;
}
