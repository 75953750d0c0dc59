//! The consumption middleware chain.
//!
//! A receiver is one link in the chain a consumer drives: it either handles
//! an event itself or forwards to the receiver it owns, so cross-cutting
//! behaviors stack as independent decorators composed by construction
//! order. The innermost receiver is the application's handler.

mod bind;
mod limit;
mod log;
mod retry;
mod stop_when_empty;

pub use bind::{BindReceiver, MessageBinder};
pub use limit::LimitReceiver;
pub use log::LogReceiver;
pub use retry::RetryReceiver;
pub use stop_when_empty::StopWhenEmptyReceiver;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::delivery::Envelope;
use crate::error::CourierError;

/// What the consumer loop should do after a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep consuming.
    Continue,
    /// Stop the consumer cooperatively.
    Stop,
}

/// One link in the consumption chain.
///
/// `start` and `terminate` bracket the consumer's lifetime; `receive` is
/// dispatched per delivery, `receive_timeout` per empty read, and
/// `receive_stop` exactly once when a stop is requested. Hooks other than
/// `receive` default to no-ops so plain handlers stay small; decorators
/// override everything they forward.
#[async_trait]
pub trait Receiver: Send {
    /// Dispatched once before the consumer loop starts.
    async fn start(&mut self) -> Result<(), CourierError> {
        Ok(())
    }

    /// Dispatched for each delivered envelope.
    async fn receive(&mut self, envelope: &mut Envelope) -> Result<Flow, CourierError>;

    /// Dispatched when a read came back empty.
    async fn receive_timeout(&mut self) -> Result<Flow, CourierError> {
        Ok(Flow::Continue)
    }

    /// Dispatched once when a stop has been requested.
    async fn receive_stop(&mut self) -> Result<(), CourierError> {
        Ok(())
    }

    /// Dispatched once after the loop has exited.
    async fn terminate(&mut self) -> Result<(), CourierError> {
        Ok(())
    }
}

/// Handler receiver built from an async closure. The bundled adapter for
/// applications that resolve handlers themselves.
pub struct FnReceiver<F>
where
    F: for<'a> FnMut(&'a mut Envelope) -> BoxFuture<'a, Result<Flow, CourierError>> + Send,
{
    handler: F,
}

impl<F> FnReceiver<F>
where
    F: for<'a> FnMut(&'a mut Envelope) -> BoxFuture<'a, Result<Flow, CourierError>> + Send,
{
    /// Wrap an async closure as the terminal receiver.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> Receiver for FnReceiver<F>
where
    F: for<'a> FnMut(&'a mut Envelope) -> BoxFuture<'a, Result<Flow, CourierError>> + Send,
{
    async fn receive(&mut self, envelope: &mut Envelope) -> Result<Flow, CourierError> {
        (self.handler)(envelope).await
    }
}

/// Terminal receiver that does nothing with deliveries.
#[derive(Debug, Default)]
pub struct NullReceiver;

#[async_trait]
impl Receiver for NullReceiver {
    async fn receive(&mut self, _envelope: &mut Envelope) -> Result<Flow, CourierError> {
        Ok(Flow::Continue)
    }
}
