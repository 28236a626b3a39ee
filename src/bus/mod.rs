//! Message bus: topic-addressed publish/subscribe of length-prefixed binary
//! messages.
//!
//! [`MessageBus`] is the seam between the core and the transport.
//! [`MemoryBus`] serves tests and single-process deployments; the NATS
//! implementation is behind the `nats` feature.

pub mod balance;
pub mod codec;
pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;
pub mod sync;

pub use balance::{BalanceTrigger, BalanceUpdate, BalanceUpdatePublisher};
pub use codec::{
    BincodeEventSerializer, CodecError, EventSerializer, JsonEventSerializer, WireFormat,
    encode_frame, split_frames,
};
pub use memory::MemoryBus;
pub use sync::{Scalar, SyncCommand, SyncEvent, SyncModel, SyncPublisher, SyncSender};

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport failures. Workers log these and retry on their next tick.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusError {
    /// The transport refused or failed the call.
    #[error("transport error: {0}")]
    Transport(String),

    /// The topic already has its consumer.
    #[error("topic {0} already has a subscriber")]
    AlreadySubscribed(String),

    /// The topic's channel is gone.
    #[error("topic {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Receiving end of one topic.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub fn new(topic: &str, rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            topic: topic.to_string(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the topic is closed.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Publish/subscribe transport. Many writers per topic, one consumer.
#[async_trait]
pub trait MessageBus: Send + Sync + fmt::Debug {
    /// Sends `payload` on `topic`. Waits while the topic's buffer is full.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError>;

    /// Claims the single consumer slot of `topic`.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;
}
