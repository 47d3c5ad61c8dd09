//! Topic bus: a cluster-wide publish/subscribe facility plus the process-local
//! queue that feeds the ingestion pipeline.
//!
//! The two are separate types on purpose. A submitted message goes to the
//! local queue (so the pipeline in this process sees it once) and to the
//! cluster bus as [`ClusterEvent::Submitted`]; only the pipeline ever emits
//! [`ClusterEvent::MessageReceived`], which is what the gateway delivers.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use colloquy_types::events::ClusterEvent;
use colloquy_types::models::IncomingEvent;

use crate::error::BusError;

/// Default buffer size for broadcast channels
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Cluster-wide publish/subscribe.
///
/// Delivery is ordered per publisher within a topic and unordered across
/// topics. The topic is derived from the event, so publisher and subscriber
/// cannot disagree on its name.
#[async_trait]
pub trait ClusterBus: Send + Sync {
    async fn publish(&self, event: ClusterEvent) -> Result<(), BusError>;

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<ClusterEvent>;
}

/// Single-node bus over `tokio::sync::broadcast`, one channel per topic.
///
/// Lagging receivers lose events.
pub struct MemoryBus {
    channels: DashMap<String, broadcast::Sender<ClusterEvent>>,
    capacity: usize,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn channel(&self, topic: &str) -> broadcast::Sender<ClusterEvent> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterBus for MemoryBus {
    async fn publish(&self, event: ClusterEvent) -> Result<(), BusError> {
        let topic = event.topic();
        // send() only fails when nobody listens, which is fine
        if self.channel(topic).send(event).is_err() {
            trace!("no subscribers on {}", topic);
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<ClusterEvent> {
        self.channel(topic).subscribe()
    }
}

pub type LocalReceiver = mpsc::UnboundedReceiver<IncomingEvent>;

/// Process-local queue of submitted messages, consumed by the pipeline.
#[derive(Clone)]
pub struct LocalQueue {
    tx: mpsc::UnboundedSender<IncomingEvent>,
}

impl LocalQueue {
    pub fn channel() -> (Self, LocalReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn submit(&self, event: IncomingEvent) -> Result<(), BusError> {
        self.tx.send(event).map_err(|_| BusError::LocalClosed)
    }
}

/// The two outputs of a client submission.
#[derive(Clone)]
pub struct Submitter {
    local: LocalQueue,
    cluster: Arc<dyn ClusterBus>,
}

impl Submitter {
    pub fn new(local: LocalQueue, cluster: Arc<dyn ClusterBus>) -> Self {
        Self { local, cluster }
    }

    /// Queue the event for this process' pipeline and announce it cluster-wide.
    pub async fn submit(&self, event: IncomingEvent) -> Result<(), BusError> {
        self.local.submit(event.clone())?;
        self.cluster.publish(ClusterEvent::Submitted(event)).await
    }
}
