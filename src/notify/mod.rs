// ============================================================================
// Change Notification
// ============================================================================
//
// Mutations compute their topics and serialized payload while recording the
// change, queue them on the transaction's commit hooks, and are published on
// detached tasks only after the commit succeeds.
//
// ============================================================================

pub mod broker;
pub mod dispatcher;
pub mod topics;

pub use broker::{Broker, BrokerError, Delivery, MemoryBroker};
pub use dispatcher::Dispatcher;
pub use topics::{Action, TopicFn, TopicScheme, Topics};
