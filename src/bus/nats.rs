//! NATS transport for the message bus.
//!
//! Publishes are retried with exponential backoff. Each subscription is
//! forwarded from the NATS subscriber into a bounded channel by a spawned
//! task so consumers see the same [`Subscription`] as with the in-memory
//! bus.

use super::{BusError, MessageBus, Subscription};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Retries after the first failed attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff base in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 10;

/// Buffer between the NATS subscriber and the consumer.
const SUBSCRIPTION_BUFFER: usize = 1_024;

pub struct NatsBus {
    client: async_nats::Client,
    max_retries: u32,
    publish_count: AtomicU64,
    error_count: AtomicU64,
}

impl NatsBus {
    /// Connects to the comma-joined `brokers`.
    pub async fn connect(brokers: &[String]) -> Result<Self, BusError> {
        let addrs = brokers.join(",");
        let client = async_nats::connect(addrs.as_str())
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        info!(brokers = %addrs, "connected to NATS");
        Ok(Self::new(client))
    }

    #[inline]
    pub fn new(client: async_nats::Client) -> Self {
        Self {
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            publish_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    #[must_use = "builders do nothing unless consumed"]
    #[inline]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    #[inline]
    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }

    #[must_use]
    #[inline]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError> {
        let max_attempts = self.max_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            match self
                .client
                .publish(topic.to_string(), payload.clone())
                .await
            {
                Ok(()) => {
                    self.publish_count.fetch_add(1, Ordering::Relaxed);
                    trace!(topic, len = payload.len(), "published to NATS");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max = max_attempts,
                        topic,
                        error = %e,
                        "NATS publish failed, retrying"
                    );
                    last_error = e.to_string();
                }
            }

            // 10ms, 20ms, 40ms, ...
            if attempt + 1 < max_attempts {
                let delay_ms = BASE_RETRY_DELAY_MS.saturating_mul(1u64 << attempt);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        self.error_count.fetch_add(1, Ordering::Relaxed);
        error!(topic, "NATS publish failed after all retries");
        Err(BusError::Transport(last_error))
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let mut subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let name = topic.to_string();
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                if tx.send(message.payload).await.is_err() {
                    break;
                }
            }
            debug!(topic = %name, "NATS subscription closed");
        });
        Ok(Subscription::new(topic, rx))
    }
}

impl std::fmt::Debug for NatsBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsBus")
            .field("publish_count", &self.publish_count.load(Ordering::Relaxed))
            .field("error_count", &self.error_count.load(Ordering::Relaxed))
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
