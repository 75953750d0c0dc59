//! Drain-and-stop decorator.

use async_trait::async_trait;
use tracing::debug;

use crate::delivery::Envelope;
use crate::error::CourierError;

use super::{Flow, Receiver};

/// Stops the consumer on the first empty read: useful for workers that
/// should drain a backlog and exit.
pub struct StopWhenEmptyReceiver {
    inner: Box<dyn Receiver>,
}

impl StopWhenEmptyReceiver {
    /// Decorate `inner`.
    pub fn new(inner: Box<dyn Receiver>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Receiver for StopWhenEmptyReceiver {
    async fn start(&mut self) -> Result<(), CourierError> {
        self.inner.start().await
    }

    async fn receive(&mut self, envelope: &mut Envelope) -> Result<Flow, CourierError> {
        self.inner.receive(envelope).await
    }

    async fn receive_timeout(&mut self) -> Result<Flow, CourierError> {
        self.inner.receive_timeout().await?;
        debug!("Queue drained");
        Ok(Flow::Stop)
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
    use crate::receiver::NullReceiver;

    #[tokio::test]
    async fn test_timeout_stops() {
        let mut receiver = StopWhenEmptyReceiver::new(Box::new(NullReceiver));
        assert_eq!(receiver.receive_timeout().await.unwrap(), Flow::Stop);
    }
}
