//! The destination facade: one send/consume/declare/destroy surface over
//! queues, topics, and sets of either.

mod queue;
mod topic;

pub use queue::{MultiQueueDestination, QueueDestination};
pub use topic::{InspectTopicDestination, MultiTopicDestination, TopicDestination};

use std::time::Duration;

use async_trait::async_trait;

use crate::consumer::Consume;
use crate::error::CourierError;
use crate::message::Message;
use crate::promise::Promise;
use crate::receiver::Receiver;

/// Options for raw sends that bypass the message model.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawOptions {
    /// Seconds before the payload becomes visible (queues only).
    pub delay: Option<Duration>,
}

impl RawOptions {
    /// No options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the visibility delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A logical send/receive target abstracting over a driver and a reading
/// strategy.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Address and hand off a message, returning its reply promise (the
    /// null promise for fire-and-forget sends).
    async fn send(&self, message: Message) -> Result<Promise, CourierError>;

    /// Send pre-serialized payload bytes, bypassing the message model.
    async fn send_raw(&self, payload: &[u8], options: RawOptions) -> Result<(), CourierError>;

    /// Build a fully wired consumer driving the given receiver chain.
    fn consumer(&self, chain: Box<dyn Receiver>) -> Result<Box<dyn Consume>, CourierError>;

    /// Create the underlying queue/topic where the driver supports
    /// management; a no-op otherwise.
    async fn declare(&self) -> Result<(), CourierError>;

    /// Remove the underlying queue/topic where the driver supports
    /// management; a no-op otherwise.
    async fn destroy(&self) -> Result<(), CourierError>;
}

/// Split a comma-separated destination list into trimmed names.
pub(crate) fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
