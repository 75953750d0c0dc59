//! Request/reply correlation over a plain queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::delivery::QueuedMessage;
use crate::driver::{QueueDriver, Wait};
use crate::error::CourierError;
use crate::message::Message;

/// Suffix appended to a request queue to derive its reply queue.
pub const REPLY_QUEUE_SUFFIX: &str = "_reply";

/// A blocking wait for one correlated reply message.
///
/// Not a language-level future: `wait` polls the reply queue until the
/// deadline. Replies carrying a different correlation id are rejected with
/// requeue so the promise actually waiting for them can claim them; a
/// reply that matches no live waiter keeps circulating.
pub enum Promise {
    /// A reply is expected on the given queue.
    Reply(ReplyPromise),
    /// Fire-and-forget: resolves to `None` immediately.
    Null,
}

impl Promise {
    /// Promise a reply on `reply_queue` correlated by `correlation_id`.
    pub fn reply(
        driver: Arc<dyn QueueDriver>,
        reply_queue: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self::Reply(ReplyPromise {
            driver,
            reply_queue: reply_queue.into(),
            correlation_id: correlation_id.into(),
        })
    }

    /// The null-object promise.
    pub fn null() -> Self {
        Self::Null
    }

    /// Whether a reply can actually arrive.
    pub fn expects_reply(&self) -> bool {
        matches!(self, Self::Reply(_))
    }

    /// The expected correlation id, when a reply is expected.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Reply(p) => Some(&p.correlation_id),
            Self::Null => None,
        }
    }

    /// Block until the correlated reply arrives or the deadline passes.
    /// A timeout is a defined `None`, not an error.
    pub async fn wait(&self, timeout: Duration) -> Result<Option<QueuedMessage>, CourierError> {
        match self {
            Self::Reply(p) => p.wait(timeout).await,
            Self::Null => Ok(None),
        }
    }
}

/// The waiting half of a needs-reply send.
pub struct ReplyPromise {
    driver: Arc<dyn QueueDriver>,
    reply_queue: String,
    correlation_id: String,
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reply(p) => f.debug_tuple("Reply").field(p).finish(),
            Self::Null => f.write_str("Null"),
        }
    }
}

impl std::fmt::Debug for ReplyPromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyPromise")
            .field("reply_queue", &self.reply_queue)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

impl ReplyPromise {
    /// The reply queue being watched.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    async fn wait(&self, timeout: Duration) -> Result<Option<QueuedMessage>, CourierError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let Some(delivery) = self.driver.pop(&self.reply_queue, Wait::For(remaining)).await?
            else {
                return Ok(None);
            };

            if delivery.message().correlation_id() == Some(self.correlation_id.as_str()) {
                self.driver.acknowledge(&delivery).await?;
                return Ok(Some(delivery));
            }

            debug!(
                queue = %self.reply_queue,
                expected = %self.correlation_id,
                got = delivery.message().correlation_id().unwrap_or("-"),
                "Requeueing reply with foreign correlation id"
            );
            self.driver.release(&delivery).await?;
        }
    }
}

/// Prepare a needs-reply message before pushing: attach a correlation id
/// and reply queue name when absent, returning both.
pub fn prepare_reply_request(message: &mut Message, request_queue: &str) -> (String, String) {
    let correlation_id = match message.correlation_id() {
        Some(id) => id.to_string(),
        None => {
            let id = Message::generate_correlation_id();
            message.set_header(crate::message::HEADER_CORRELATION_ID, id.clone());
            id
        }
    };

    let reply_queue = match message.reply_to() {
        Some(queue) => queue.to_string(),
        None => {
            let queue = format!("{request_queue}{REPLY_QUEUE_SUFFIX}");
            message.set_header(crate::message::HEADER_REPLY_TO, queue.clone());
            queue
        }
    };

    (correlation_id, reply_queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDriver;
    use crate::message::{HEADER_CORRELATION_ID, HEADER_REPLY_TO};

    async fn push_reply(driver: &MemoryDriver, queue: &str, correlation_id: &str) {
        let reply = Message::new(serde_json::json!({"ok": true}))
            .with_destination(queue)
            .with_header(HEADER_CORRELATION_ID, correlation_id);
        driver.push(&reply).await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_correlation_is_requeued_and_right_one_returned() {
        let driver = Arc::new(MemoryDriver::new());
        push_reply(&driver, "jobs_reply", "someone-else").await;
        push_reply(&driver, "jobs_reply", "mine").await;

        let promise = Promise::reply(driver.clone(), "jobs_reply", "mine");
        let reply = promise
            .wait(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("correlated reply");

        assert_eq!(reply.message().correlation_id(), Some("mine"));
        // The foreign reply is still available for its own waiter.
        assert_eq!(driver.count("jobs_reply").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_none_at_deadline() {
        let driver = Arc::new(MemoryDriver::new());
        let promise = Promise::reply(driver, "jobs_reply", "mine");

        let started = Instant::now();
        let reply = promise.wait(Duration::from_secs(2)).await.unwrap();

        assert!(reply.is_none());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_null_promise_resolves_immediately() {
        let promise = Promise::null();
        assert!(!promise.expects_reply());
        let reply = promise.wait(Duration::from_secs(3600)).await.unwrap();
        assert!(reply.is_none());
    }

    #[test]
    fn test_prepare_attaches_missing_headers_only() {
        let mut message = Message::empty().with_reply();
        let (correlation_id, reply_queue) = prepare_reply_request(&mut message, "jobs");

        assert_eq!(message.correlation_id(), Some(correlation_id.as_str()));
        assert_eq!(reply_queue, "jobs_reply");
        assert_eq!(message.reply_to(), Some("jobs_reply"));

        let mut preset = Message::empty()
            .with_reply()
            .with_header(HEADER_CORRELATION_ID, "fixed")
            .with_header(HEADER_REPLY_TO, "elsewhere");
        let (correlation_id, reply_queue) = prepare_reply_request(&mut preset, "jobs");
        assert_eq!(correlation_id, "fixed");
        assert_eq!(reply_queue, "elsewhere");
    }
}
