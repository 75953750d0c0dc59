//! Transport driver contracts.
//!
//! Concrete transports implement [`QueueDriver`] (point-to-point) and/or
//! [`TopicDriver`] (publish/subscribe). Optional capabilities (bulk
//! reservation, non-destructive inspection, queue/topic management) are
//! separate traits reached through probe methods with a `None` default, so
//! callers check support explicitly instead of fishing for errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::delivery::{Envelope, QueuedMessage};
use crate::error::CourierError;
use crate::message::Message;

/// How long a read/poll call may block.
///
/// Rust rendering of the `0 / positive / negative` duration convention:
/// `NoWait` returns immediately, `For` blocks up to the given duration,
/// `Forever` is an explicit, deliberate unbounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return immediately if nothing is available.
    NoWait,
    /// Block up to the given duration.
    For(Duration),
    /// Block until something arrives.
    Forever,
}

impl Wait {
    /// Convenience constructor for a bounded wait in seconds.
    pub fn secs(secs: u64) -> Self {
        Wait::For(Duration::from_secs(secs))
    }

    /// The bounded duration, if any.
    pub fn duration(self) -> Option<Duration> {
        match self {
            Wait::For(d) => Some(d),
            _ => None,
        }
    }
}

/// Structured transport report returned by [`QueueDriver::stats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverStats {
    /// Per-queue depth report; empty when the transport cannot report.
    pub queues: Vec<QueueStats>,
}

impl DriverStats {
    /// Whether the driver reported anything at all.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

/// Depth report for a single queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue name.
    pub name: String,
    /// Messages ready for delivery.
    pub ready: u64,
    /// Messages reserved by consumers and awaiting settlement.
    pub reserved: u64,
}

/// Point-to-point transport contract.
#[async_trait]
pub trait QueueDriver: Send + Sync {
    /// Serialize and push a message to its destination queue.
    async fn push(&self, message: &Message) -> Result<(), CourierError>;

    /// Push pre-serialized payload bytes, bypassing the message model.
    async fn push_raw(
        &self,
        queue: &str,
        payload: &[u8],
        delay: Option<Duration>,
    ) -> Result<(), CourierError>;

    /// Pop the next visible message, blocking per `wait`.
    async fn pop(&self, queue: &str, wait: Wait) -> Result<Option<QueuedMessage>, CourierError>;

    /// Mark a delivery permanently consumed.
    async fn acknowledge(&self, message: &QueuedMessage) -> Result<(), CourierError>;

    /// Return a delivery to availability. Does not change the attempt count.
    async fn release(&self, message: &QueuedMessage) -> Result<(), CourierError>;

    /// Number of messages waiting in a queue.
    ///
    /// Default: unsupported.
    async fn count(&self, queue: &str) -> Result<u64, CourierError> {
        let _ = queue;
        Err(CourierError::unsupported("count"))
    }

    /// Transport statistics report.
    ///
    /// Default: empty.
    async fn stats(&self) -> Result<DriverStats, CourierError> {
        Ok(DriverStats::default())
    }

    /// Close the underlying connection.
    async fn close(&self) -> Result<(), CourierError>;

    /// Bulk-reservation capability, if the transport has one.
    fn reserve(&self) -> Option<&dyn ReserveQueues> {
        None
    }

    /// Non-destructive inspection capability, if the transport has one.
    fn inspect(&self) -> Option<&dyn InspectQueues> {
        None
    }

    /// Queue management capability, if the transport has one.
    fn manage(&self) -> Option<&dyn ManageQueues> {
        None
    }
}

/// Bulk reservation: remove several messages from visibility in one
/// round-trip. Reserved messages must be settled or released.
#[async_trait]
pub trait ReserveQueues: Send + Sync {
    /// Reserve up to `count` messages from a queue.
    async fn reserve_batch(
        &self,
        queue: &str,
        count: usize,
        wait: Wait,
    ) -> Result<Vec<QueuedMessage>, CourierError>;
}

/// Non-destructive queue inspection.
#[async_trait]
pub trait InspectQueues: Send + Sync {
    /// Page through a queue without removing anything.
    async fn peek(
        &self,
        queue: &str,
        page_size: usize,
        page: usize,
    ) -> Result<Vec<QueuedMessage>, CourierError>;
}

/// Queue lifecycle management.
#[async_trait]
pub trait ManageQueues: Send + Sync {
    /// Create a queue. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), CourierError>;

    /// Remove a queue and everything in it.
    async fn delete_queue(&self, queue: &str) -> Result<(), CourierError>;

    /// All currently known queue names.
    async fn queue_names(&self) -> Result<Vec<String>, CourierError>;
}

/// Callback invoked synchronously by a topic driver for each delivery that
/// matches the subscription it was registered with.
pub type TopicCallback =
    Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<(), CourierError>> + Send + Sync>;

/// Publish/subscribe transport contract.
#[async_trait]
pub trait TopicDriver: Send + Sync {
    /// Serialize and publish a message to its destination topic.
    async fn publish(&self, message: &Message) -> Result<(), CourierError>;

    /// Publish pre-serialized payload bytes.
    async fn publish_raw(&self, topic: &str, payload: &[u8]) -> Result<(), CourierError>;

    /// Register a callback for a set of topic patterns. Callbacks are kept
    /// per original pattern, so independent wildcard subscriptions on one
    /// connection each see only their own matches.
    async fn subscribe(
        &self,
        patterns: &[String],
        callback: TopicCallback,
    ) -> Result<(), CourierError>;

    /// Bounded poll: deliver matching messages to their subscription
    /// callbacks, returning how many were delivered.
    async fn consume(&self, wait: Wait) -> Result<usize, CourierError>;

    /// Close the underlying connection.
    async fn close(&self) -> Result<(), CourierError>;

    /// An independent subscriber over the same transport: shared broker
    /// state, empty local subscriptions.
    fn fork(&self) -> Arc<dyn TopicDriver>;

    /// Topic management capability, if the transport has one.
    fn manage(&self) -> Option<&dyn ManageTopics> {
        None
    }

    /// Topic inspection capability, if the transport has one.
    fn inspect(&self) -> Option<&dyn InspectTopics> {
        None
    }
}

/// Topic lifecycle management.
#[async_trait]
pub trait ManageTopics: Send + Sync {
    /// Create whatever backs a topic pattern. Idempotent.
    async fn declare_topic(&self, topic: &str) -> Result<(), CourierError>;

    /// Remove whatever backs a topic pattern.
    async fn delete_topic(&self, topic: &str) -> Result<(), CourierError>;
}

/// Non-destructive topic inspection.
#[async_trait]
pub trait InspectTopics: Send + Sync {
    /// Messages currently waiting under a topic pattern.
    async fn message_count(&self, topic: &str) -> Result<u64, CourierError>;

    /// Page through a topic's backlog without removing anything.
    async fn peek(
        &self,
        topic: &str,
        page_size: usize,
        page: usize,
    ) -> Result<Vec<QueuedMessage>, CourierError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_duration() {
        assert_eq!(Wait::NoWait.duration(), None);
        assert_eq!(Wait::Forever.duration(), None);
        assert_eq!(Wait::secs(5).duration(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_stats_default_is_empty() {
        assert!(DriverStats::default().is_empty());
    }
}
