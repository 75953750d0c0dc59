//! Consumer loops driving the receiver pipeline.

mod queue;
mod topic;

pub use queue::QueueConsumer;
pub use topic::TopicConsumer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CourierError;

/// Cancellation flag for a consumer.
///
/// Cloneable and safe to trip from a signal-handling context at any point;
/// the flag write is the single cross-context mutation, and the loop
/// observes it within at most one more read/poll cycle. `stop` is
/// idempotent.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    /// Create an untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// The run/stop surface shared by queue and topic consumers.
#[async_trait]
pub trait Consume: Send {
    /// Run the consumer loop until it is stopped or fails.
    async fn run(&mut self) -> Result<(), CourierError>;

    /// The consumer's stop token, for signal handlers and supervisors.
    fn stop_token(&self) -> StopToken;
}
