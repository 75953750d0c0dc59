//! Retry/backoff decorator.
//!
//! The consumer loop never retries; retry policy lives here, layered on top
//! of the handler.

use async_trait::async_trait;
use tracing::{error, warn};

use crate::config::RetryPolicy;
use crate::delivery::Envelope;
use crate::error::CourierError;

use super::{Flow, Receiver};

/// Requeues failed deliveries with backoff until the attempt budget runs
/// out, then drops them.
///
/// The message's own max-try count takes precedence over the policy's.
/// Connection errors are not failures of the delivery and propagate as-is.
pub struct RetryReceiver {
    policy: RetryPolicy,
    inner: Box<dyn Receiver>,
}

impl RetryReceiver {
    /// Decorate `inner` with the given policy.
    pub fn new(policy: RetryPolicy, inner: Box<dyn Receiver>) -> Self {
        Self { policy, inner }
    }
}

#[async_trait]
impl Receiver for RetryReceiver {
    async fn start(&mut self) -> Result<(), CourierError> {
        self.inner.start().await
    }

    async fn receive(&mut self, envelope: &mut Envelope) -> Result<Flow, CourierError> {
        match self.inner.receive(envelope).await {
            Ok(flow) => Ok(flow),
            Err(e) if e.is_connection_error() => Err(e),
            Err(e) => {
                let attempt = envelope.delivery().attempt();
                let max_tries = envelope
                    .message()
                    .max_tries()
                    .unwrap_or(self.policy.max_tries);

                if attempt < max_tries {
                    let delay = self.policy.backoff.delay(attempt.saturating_sub(1));
                    warn!(
                        error = %e,
                        attempt = attempt,
                        max_tries = max_tries,
                        delay_ms = delay.as_millis() as u64,
                        "Delivery failed, requeueing with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    envelope.reject(true).await?;
                } else {
                    error!(
                        error = %e,
                        attempt = attempt,
                        max_tries = max_tries,
                        "Delivery failed permanently, dropping"
                    );
                    envelope.reject(false).await?;
                }
                Ok(Flow::Continue)
            }
        }
    }

    async fn receive_timeout(&mut self) -> Result<Flow, CourierError> {
        self.inner.receive_timeout().await
    }

    async fn receive_stop(&mut self) -> Result<(), CourierError> {
        self.inner.receive_stop().await
    }

    async fn terminate(&mut self) -> Result<(), CourierError> {
        self.inner.terminate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffStrategy;
    use crate::memory::MemoryDriver;
    use crate::message::Message;
    use crate::driver::{QueueDriver, Wait};
    use std::sync::Arc;
    use std::time::Duration;

    struct FailingReceiver;

    #[async_trait]
    impl Receiver for FailingReceiver {
        async fn receive(&mut self, _envelope: &mut Envelope) -> Result<Flow, CourierError> {
            Err(CourierError::server("handler blew up"))
        }
    }

    fn fast_policy(max_tries: u32) -> RetryPolicy {
        RetryPolicy::new(max_tries).with_backoff(BackoffStrategy::Fixed(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_failed_delivery_is_requeued_until_budget_exhausted() {
        let driver = Arc::new(MemoryDriver::new());
        driver
            .push(&Message::new(serde_json::json!(1)).with_destination("jobs"))
            .await
            .unwrap();

        let mut receiver = RetryReceiver::new(fast_policy(2), Box::new(FailingReceiver));

        // Attempt 1 of 2: requeued.
        let delivery = driver.pop("jobs", Wait::NoWait).await.unwrap().unwrap();
        let mut env = crate::delivery::Envelope::queue(delivery, driver.clone());
        assert_eq!(receiver.receive(&mut env).await.unwrap(), Flow::Continue);
        assert_eq!(driver.count("jobs").await.unwrap(), 1);

        // Attempt 2 of 2: dropped.
        let delivery = driver.pop("jobs", Wait::NoWait).await.unwrap().unwrap();
        assert_eq!(delivery.attempt(), 2);
        let mut env = crate::delivery::Envelope::queue(delivery, driver.clone());
        assert_eq!(receiver.receive(&mut env).await.unwrap(), Flow::Continue);
        assert_eq!(driver.count("jobs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_message_max_tries_overrides_policy() {
        let driver = Arc::new(MemoryDriver::new());
        driver
            .push(
                &Message::new(serde_json::json!(1))
                    .with_destination("jobs")
                    .with_max_tries(1),
            )
            .await
            .unwrap();

        let mut receiver = RetryReceiver::new(fast_policy(5), Box::new(FailingReceiver));

        let delivery = driver.pop("jobs", Wait::NoWait).await.unwrap().unwrap();
        let mut env = crate::delivery::Envelope::queue(delivery, driver.clone());
        receiver.receive(&mut env).await.unwrap();

        // Dropped on the first failure: the message allowed a single try.
        assert_eq!(driver.count("jobs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connection_errors_propagate() {
        struct LostReceiver;

        #[async_trait]
        impl Receiver for LostReceiver {
            async fn receive(&mut self, _envelope: &mut Envelope) -> Result<Flow, CourierError> {
                Err(CourierError::connection_lost("socket reset"))
            }
        }

        let driver = Arc::new(MemoryDriver::new());
        driver
            .push(&Message::new(serde_json::json!(1)).with_destination("jobs"))
            .await
            .unwrap();

        let mut receiver = RetryReceiver::new(fast_policy(3), Box::new(LostReceiver));

        let delivery = driver.pop("jobs", Wait::NoWait).await.unwrap().unwrap();
        let mut env = crate::delivery::Envelope::queue(delivery, driver.clone());
        let err = receiver.receive(&mut env).await.unwrap_err();
        assert!(err.is_connection_error());
    }
}
