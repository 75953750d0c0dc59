//! Structured logging decorator.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::delivery::Envelope;
use crate::error::CourierError;

use super::{Flow, Receiver};

/// Logs every delivery around the inner receiver.
pub struct LogReceiver {
    inner: Box<dyn Receiver>,
}

impl LogReceiver {
    /// Decorate `inner`.
    pub fn new(inner: Box<dyn Receiver>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Receiver for LogReceiver {
    async fn start(&mut self) -> Result<(), CourierError> {
        info!("Receiver chain starting");
        self.inner.start().await
    }

    async fn receive(&mut self, envelope: &mut Envelope) -> Result<Flow, CourierError> {
        info!(
            handler = envelope.message().handler().unwrap_or("-"),
            destination = envelope.message().destination().unwrap_or("-"),
            attempt = envelope.delivery().attempt(),
            "Received message"
        );
        match self.inner.receive(envelope).await {
            Ok(flow) => Ok(flow),
            Err(e) => {
                warn!(error = %e, "Delivery failed");
                Err(e)
            }
        }
    }

    async fn receive_timeout(&mut self) -> Result<Flow, CourierError> {
        self.inner.receive_timeout().await
    }

    async fn receive_stop(&mut self) -> Result<(), CourierError> {
        info!("Stop requested");
        self.inner.receive_stop().await
    }

    async fn terminate(&mut self) -> Result<(), CourierError> {
        info!("Receiver chain terminating");
        self.inner.terminate().await
    }
}
