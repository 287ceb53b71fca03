//! An in-process forwarder connecting consumer and producer faces.
//!
//! The router keeps one route per registered prefix and forwards each
//! request to the producer with the longest matching prefix. Requests with no
//! route are nacked; requests that are not answered within the configured
//! lifetime time out, just as they would behind a real forwarder.
//!
//! ```ignore
//! let net = Loopback::new();
//! let mut producer = net.producer();
//! producer.register_prefix(&Name::new("/test"))?;
//! let mut consumer = net.consumer();
//! consumer.express_interest(&Name::new("/test/0"))?;
//! ```
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use itertools::Itertools;
use parking_lot::Mutex;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::{Duration, Instant},
};

use super::{Connect, ConsumerFace, FaceEvent, NackReason, ProducerEvent, ProducerFace};
use crate::{error::FaceError, name::Name};

/// Default request lifetime, after which unanswered requests time out.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(4);

struct Incoming {
    name: Name,
    reply: UnboundedSender<Reply>,
}

struct Reply {
    name: Name,
    content: Bytes,
}

struct Route {
    prefix: Name,
    face_id: u64,
    tx: UnboundedSender<Incoming>,
}

#[derive(Default)]
struct Router {
    next_id: u64,
    routes: Vec<Route>,
}

impl Router {
    fn lookup(&self, name: &Name) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|r| name.has_prefix(&r.prefix))
            .max_by_key(|r| r.prefix.len())
    }

    fn withdraw(&mut self, face_id: u64) {
        self.routes.retain(|r| r.face_id != face_id);
    }
}

/// Handle to an in-process network. Cheap to clone; clones share routes.
#[derive(Clone)]
pub struct Loopback {
    router: Arc<Mutex<Router>>,
    lifetime: Duration,
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl Loopback {
    /// Create an empty network with the default request lifetime.
    pub fn new() -> Self {
        Self { router: Arc::default(), lifetime: DEFAULT_LIFETIME }
    }

    /// Set the lifetime of requests expressed by consumers opened afterwards.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Open a consumer face.
    pub fn consumer(&self) -> LoopbackConsumer {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        LoopbackConsumer {
            router: self.router.clone(),
            lifetime: self.lifetime,
            reply_tx,
            reply_rx,
            pending: HashMap::new(),
            local: VecDeque::new(),
            closed: false,
        }
    }

    /// Open a producer face.
    pub fn producer(&self) -> LoopbackProducer {
        let id = {
            let mut router = self.router.lock();
            router.next_id += 1;
            router.next_id
        };
        let (tx, rx) = mpsc::unbounded_channel();
        LoopbackProducer {
            id,
            router: self.router.clone(),
            tx,
            rx,
            awaiting: HashMap::new(),
            local: VecDeque::new(),
            closed: false,
        }
    }

    /// Number of registered prefixes.
    pub fn routes(&self) -> usize {
        self.router.lock().routes.len()
    }
}

#[async_trait]
impl Connect for Loopback {
    type Consumer = LoopbackConsumer;
    type Producer = LoopbackProducer;

    async fn consumer(&self) -> Result<LoopbackConsumer, FaceError> {
        Ok(Loopback::consumer(self))
    }

    async fn producer(&self) -> Result<LoopbackProducer, FaceError> {
        Ok(Loopback::producer(self))
    }
}

/// Consumer face on a [`Loopback`] network.
pub struct LoopbackConsumer {
    router: Arc<Mutex<Router>>,
    lifetime: Duration,
    reply_tx: UnboundedSender<Reply>,
    reply_rx: UnboundedReceiver<Reply>,
    /// Expiry instant of each request awaiting a reply.
    pending: HashMap<Name, Instant>,
    local: VecDeque<FaceEvent>,
    closed: bool,
}

impl ConsumerFace for LoopbackConsumer {
    fn express_interest(&mut self, name: &Name) -> Result<(), FaceError> {
        if self.closed {
            return Err(FaceError::Closed);
        }
        if self.pending.contains_key(name) {
            self.local.push_back(FaceEvent::Nack { name: name.clone(), reason: NackReason::Duplicate });
            return Ok(());
        }

        let incoming = Incoming { name: name.clone(), reply: self.reply_tx.clone() };
        let forwarded = match self.router.lock().lookup(name) {
            Some(route) => route.tx.send(incoming).is_ok(),
            None => false,
        };
        if forwarded {
            self.pending.insert(name.clone(), Instant::now() + self.lifetime);
        } else {
            self.local.push_back(FaceEvent::Nack { name: name.clone(), reason: NackReason::NoRoute });
        }
        Ok(())
    }

    fn process_events(&mut self, events: &mut Vec<FaceEvent>) -> Result<(), FaceError> {
        if self.closed {
            return Err(FaceError::Closed);
        }
        events.extend(self.local.drain(..));

        while let Ok(reply) = self.reply_rx.try_recv() {
            // unsolicited or late data is dropped, as a forwarder would
            if self.pending.remove(&reply.name).is_some() {
                events.push(FaceEvent::Data { name: reply.name, payload_len: reply.content.len() as u64 });
            }
        }

        let now = Instant::now();
        let expired = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(name, &deadline)| (deadline, name.clone()))
            .sorted()
            .collect_vec();
        for (_, name) in expired {
            self.pending.remove(&name);
            events.push(FaceEvent::Timeout { name });
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.closed = true;
        self.pending.clear();
        self.local.clear();
        self.reply_rx.close();
    }
}

/// Producer face on a [`Loopback`] network.
pub struct LoopbackProducer {
    id: u64,
    router: Arc<Mutex<Router>>,
    tx: UnboundedSender<Incoming>,
    rx: UnboundedReceiver<Incoming>,
    /// Reply path of each request received but not yet answered.
    awaiting: HashMap<Name, UnboundedSender<Reply>>,
    local: VecDeque<ProducerEvent>,
    closed: bool,
}

impl ProducerFace for LoopbackProducer {
    fn register_prefix(&mut self, prefix: &Name) -> Result<(), FaceError> {
        if self.closed {
            return Err(FaceError::Closed);
        }
        let mut router = self.router.lock();
        if router.routes.iter().any(|r| r.prefix.as_prefix() == prefix.as_prefix()) {
            self.local.push_back(ProducerEvent::RegisterFailed {
                prefix: prefix.clone(),
                reason: "prefix already registered".to_string(),
            });
        } else {
            router.routes.push(Route { prefix: prefix.clone(), face_id: self.id, tx: self.tx.clone() });
            self.local.push_back(ProducerEvent::Registered { prefix: prefix.clone() });
        }
        Ok(())
    }

    fn process_events(&mut self, events: &mut Vec<ProducerEvent>) -> Result<(), FaceError> {
        if self.closed {
            return Err(FaceError::Closed);
        }
        events.extend(self.local.drain(..));
        while let Ok(Incoming { name, reply }) = self.rx.try_recv() {
            self.awaiting.insert(name.clone(), reply);
            events.push(ProducerEvent::Interest { name });
        }
        Ok(())
    }

    fn put_data(&mut self, name: &Name, content: Bytes, _freshness: Duration) -> Result<(), FaceError> {
        if self.closed {
            return Err(FaceError::Closed);
        }
        if let Some(reply) = self.awaiting.remove(name) {
            // the consumer may have gone away; the data is simply lost
            let _ = reply.send(Reply { name: name.clone(), content });
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.closed = true;
        self.router.lock().withdraw(self.id);
        self.rx.close();
        self.awaiting.clear();
    }
}

impl Drop for LoopbackProducer {
    fn drop(&mut self) {
        self.router.lock().withdraw(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<F: ConsumerFace>(face: &mut F) -> Vec<FaceEvent> {
        let mut events = Vec::new();
        face.process_events(&mut events).unwrap();
        events
    }

    fn drain_producer(face: &mut LoopbackProducer) -> Vec<ProducerEvent> {
        let mut events = Vec::new();
        face.process_events(&mut events).unwrap();
        events
    }

    #[tokio::test]
    async fn request_reaches_producer_and_back() {
        let net = Loopback::new();
        let mut producer = net.producer();
        producer.register_prefix(&Name::new("/test")).unwrap();
        assert_eq!(drain_producer(&mut producer), vec![ProducerEvent::Registered { prefix: Name::new("/test") }]);

        let mut consumer = net.consumer();
        let name = Name::new("/test/0");
        consumer.express_interest(&name).unwrap();

        assert_eq!(drain_producer(&mut producer), vec![ProducerEvent::Interest { name: name.clone() }]);
        producer.put_data(&name, Bytes::from_static(&[0; 100]), Duration::from_secs(1)).unwrap();

        assert_eq!(drain(&mut consumer), vec![FaceEvent::Data { name, payload_len: 100 }]);
    }

    #[tokio::test]
    async fn unrouted_requests_are_nacked() {
        let net = Loopback::new();
        let mut consumer = net.consumer();
        let name = Name::new("/nowhere/0");
        consumer.express_interest(&name).unwrap();
        assert_eq!(drain(&mut consumer), vec![FaceEvent::Nack { name, reason: NackReason::NoRoute }]);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_requests_time_out() {
        let net = Loopback::new().with_lifetime(Duration::from_millis(100));
        let mut producer = net.producer();
        producer.register_prefix(&Name::new("/test")).unwrap();

        let mut consumer = net.consumer();
        let name = Name::new("/test/0");
        consumer.express_interest(&name).unwrap();
        assert!(drain(&mut consumer).is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(drain(&mut consumer), vec![FaceEvent::Timeout { name: name.clone() }]);

        // a late answer is not reported
        drain_producer(&mut producer);
        producer.put_data(&name, Bytes::new(), Duration::ZERO).unwrap();
        assert!(drain(&mut consumer).is_empty());
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let net = Loopback::new();
        let mut first = net.producer();
        first.register_prefix(&Name::new("/test")).unwrap();

        let mut second = net.producer();
        second.register_prefix(&Name::new("/test/")).unwrap();
        assert!(matches!(
            drain_producer(&mut second).as_slice(),
            [ProducerEvent::RegisterFailed { .. }]
        ));
        assert_eq!(net.routes(), 1);
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let net = Loopback::new();
        let mut wide = net.producer();
        wide.register_prefix(&Name::new("/a")).unwrap();
        let mut narrow = net.producer();
        narrow.register_prefix(&Name::new("/a/b")).unwrap();
        drain_producer(&mut wide);
        drain_producer(&mut narrow);

        let mut consumer = net.consumer();
        consumer.express_interest(&Name::new("/a/b/1")).unwrap();
        consumer.express_interest(&Name::new("/a/c/1")).unwrap();

        assert_eq!(drain_producer(&mut narrow), vec![ProducerEvent::Interest { name: Name::new("/a/b/1") }]);
        assert_eq!(drain_producer(&mut wide), vec![ProducerEvent::Interest { name: Name::new("/a/c/1") }]);
    }

    #[tokio::test]
    async fn shutdown_withdraws_routes() {
        let net = Loopback::new();
        let mut producer = net.producer();
        producer.register_prefix(&Name::new("/test")).unwrap();
        assert_eq!(net.routes(), 1);
        producer.shutdown();
        assert_eq!(net.routes(), 0);
        assert!(matches!(producer.process_events(&mut Vec::new()), Err(FaceError::Closed)));

        let mut consumer = net.consumer();
        consumer.shutdown();
        assert!(matches!(consumer.express_interest(&Name::new("/test/0")), Err(FaceError::Closed)));
    }
}
