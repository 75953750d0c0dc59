//! Message-count limiting decorator.

use async_trait::async_trait;
use tracing::debug;

use crate::delivery::Envelope;
use crate::error::CourierError;

use super::{Flow, Receiver};

/// Stops the consumer after a fixed number of deliveries.
pub struct LimitReceiver {
    remaining: u64,
    inner: Box<dyn Receiver>,
}

impl LimitReceiver {
    /// Decorate `inner`, allowing at most `limit` deliveries.
    pub fn new(limit: u64, inner: Box<dyn Receiver>) -> Self {
        Self {
            remaining: limit,
            inner,
        }
    }
}

#[async_trait]
impl Receiver for LimitReceiver {
    async fn start(&mut self) -> Result<(), CourierError> {
        self.inner.start().await
    }

    async fn receive(&mut self, envelope: &mut Envelope) -> Result<Flow, CourierError> {
        let flow = self.inner.receive(envelope).await?;
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            debug!("Message limit reached");
            return Ok(Flow::Stop);
        }
        Ok(flow)
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
    use crate::delivery::{DeliveryHandle, QueuedMessage};
    use crate::message::Message;
    use crate::receiver::NullReceiver;

    fn envelope() -> Envelope {
        Envelope::topic(
            QueuedMessage::new(Message::empty(), b"{}".to_vec(), DeliveryHandle::new("h"), 1),
            None,
        )
    }

    #[tokio::test]
    async fn test_stops_at_limit() {
        let mut receiver = LimitReceiver::new(2, Box::new(NullReceiver));

        let mut env = envelope();
        assert_eq!(receiver.receive(&mut env).await.unwrap(), Flow::Continue);
        assert_eq!(receiver.receive(&mut env).await.unwrap(), Flow::Stop);
    }
}
