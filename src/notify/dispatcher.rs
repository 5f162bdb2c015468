use super::{Broker, Topics};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{Instrument, Level, event, info_span};

/// Fire-and-forget publisher in front of a [`Broker`].
///
/// Each message goes out on its own detached task. Failures are logged and
/// dropped; nothing is retried and no ordering holds between messages.
#[derive(Clone, Default)]
pub struct Dispatcher {
    broker: Option<Arc<dyn Broker>>,
}

impl Dispatcher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker: Some(broker),
        }
    }

    /// A dispatcher that drops every message.
    pub fn disabled() -> Self {
        Self { broker: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.broker.is_some()
    }

    pub fn publish_detached(&self, topics: Topics, payload: serde_json::Value) {
        let Some(broker) = self.broker.clone() else {
            return;
        };
        if topics.is_empty() {
            return;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!(
                    "no async runtime available, dropping notification for {:?}",
                    topics
                );
                return;
            }
        };

        let span = info_span!("registry.notify", topic = %topics[0], topics = topics.len());
        handle.spawn(
            async move {
                match broker.dispatch(&topics, &payload).await {
                    Ok(()) => event!(Level::DEBUG, "notification dispatched"),
                    Err(err) => event!(Level::ERROR, error = %err, "notification dispatch failed"),
                }
            }
            .instrument(span),
        );
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
