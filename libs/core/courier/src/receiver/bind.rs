//! Payload binding decorator.

use async_trait::async_trait;
use tracing::debug;

use crate::delivery::Envelope;
use crate::error::CourierError;
use crate::message::Message;

use super::{Flow, Receiver};

/// Recognizes a message's declared name/shape and produces the typed
/// payload data that should replace it.
///
/// Returning `None` is not an error: it only signals the next binder
/// should try.
pub trait MessageBinder: Send + Sync {
    /// Binder name, for logging.
    fn name(&self) -> &'static str;

    /// Produce replacement payload data, or `None` when the message is not
    /// this binder's to bind.
    fn bind(&self, message: &Message) -> Option<serde_json::Value>;
}

/// Runs an ordered binder list before forwarding a delivery.
///
/// The first binder that recognizes the message wins and its output is
/// written into the envelope in place; the rest are skipped. When none
/// match, the message is forwarded unchanged.
pub struct BindReceiver {
    binders: Vec<Box<dyn MessageBinder>>,
    inner: Box<dyn Receiver>,
}

impl BindReceiver {
    /// Decorate `inner` with the given binders, tried in order.
    pub fn new(binders: Vec<Box<dyn MessageBinder>>, inner: Box<dyn Receiver>) -> Self {
        Self { binders, inner }
    }
}

#[async_trait]
impl Receiver for BindReceiver {
    async fn start(&mut self) -> Result<(), CourierError> {
        self.inner.start().await
    }

    async fn receive(&mut self, envelope: &mut Envelope) -> Result<Flow, CourierError> {
        for binder in &self.binders {
            if let Some(data) = binder.bind(envelope.message()) {
                debug!(binder = binder.name(), "Bound message payload");
                envelope.message_mut().set_data(data);
                break;
            }
        }
        self.inner.receive(envelope).await
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
