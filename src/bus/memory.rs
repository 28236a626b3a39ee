use super::{BusError, MessageBus, Subscription};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::trace;

/// Default per-topic buffer.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1_024;

#[derive(Debug)]
struct Topic {
    tx: mpsc::Sender<Bytes>,
    rx: Option<mpsc::Receiver<Bytes>>,
}

/// In-process bus backed by one bounded channel per topic.
///
/// Messages published before the consumer subscribes are buffered.
#[derive(Debug)]
pub struct MemoryBus {
    topics: DashMap<String, Topic>,
    capacity: usize,
    failing: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes every publish fail with [`BusError::Transport`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn sender(&self, topic: &str) -> mpsc::Sender<Bytes> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.capacity);
                Topic { tx, rx: Some(rx) }
            })
            .tx
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Transport(format!("publish to {topic} refused")));
        }
        let tx = self.sender(topic);
        trace!(topic, len = payload.len(), "publishing");
        tx.send(payload)
            .await
            .map_err(|_| BusError::Closed(topic.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        self.sender(topic);
        let rx = self
            .topics
            .get_mut(topic)
            .and_then(|mut entry| entry.rx.take())
            .ok_or_else(|| BusError::AlreadySubscribed(topic.to_string()))?;
        Ok(Subscription::new(topic, rx))
    }
}
