use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker rejected message for {topics:?}: {reason}")]
    Rejected { topics: Vec<String>, reason: String },
}

/// Message sink for change notifications.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn dispatch(
        &self,
        topics: &[String],
        payload: &serde_json::Value,
    ) -> Result<(), BrokerError>;
}

/// One dispatched message.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topics: Vec<String>,
    pub payload: serde_json::Value,
}

/// In-process broker: fans every message out to `subscribe`rs and keeps a
/// delivery log.
pub struct MemoryBroker {
    sender: broadcast::Sender<Delivery>,
    log: Mutex<Vec<Delivery>>,
    delivered: Notify,
}

impl MemoryBroker {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            log: Mutex::new(Vec::new()),
            delivered: Notify::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.sender.subscribe()
    }

    /// Every message dispatched so far, in arrival order.
    pub fn published(&self) -> Vec<Delivery> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages whose topic list contains `topic`.
    pub fn published_to(&self, topic: &str) -> Vec<Delivery> {
        self.published()
            .into_iter()
            .filter(|d| d.topics.iter().any(|t| t == topic))
            .collect()
    }

    /// Waits until at least `count` messages arrived or `timeout` passes,
    /// returning whatever the log holds at that point.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Delivery> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.delivered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let current = self.published();
            if current.len() >= count {
                return current;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.published();
            }
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn dispatch(
        &self,
        topics: &[String],
        payload: &serde_json::Value,
    ) -> Result<(), BrokerError> {
        let delivery = Delivery {
            topics: topics.to_vec(),
            payload: payload.clone(),
        };
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delivery.clone());
        // No live subscriber is not a failure; the log still has it.
        let _ = self.sender.send(delivery);
        self.delivered.notify_waiters();
        Ok(())
    }
}
