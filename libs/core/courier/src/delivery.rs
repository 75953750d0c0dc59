//! Delivered messages and their completion surface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::QueueDriver;
use crate::error::CourierError;
use crate::message::Message;

/// Opaque receipt issued by the driver that produced a delivery.
///
/// The core never interprets its contents; it only hands the receipt back to
/// the originating driver for acknowledge/release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryHandle(String);

impl DeliveryHandle {
    /// Wrap a driver-private receipt token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw receipt token, for the driver that issued it.
    pub fn token(&self) -> &str {
        &self.0
    }
}

/// A message as delivered by a transport: the decoded [`Message`] plus the
/// raw wire payload, the driver's receipt, and the delivery attempt counter
/// (1 on first delivery, incremented by the driver on redelivery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    message: Message,
    raw_payload: Vec<u8>,
    handle: DeliveryHandle,
    attempt: u32,
}

impl QueuedMessage {
    /// Assemble a delivery. Called by drivers on pop/reserve.
    pub fn new(message: Message, raw_payload: Vec<u8>, handle: DeliveryHandle, attempt: u32) -> Self {
        Self {
            message,
            raw_payload,
            handle,
            attempt,
        }
    }

    /// The decoded message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Mutable access to the decoded message (binders rewrite payload data
    /// in place).
    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    /// The raw serialized payload as it came off the wire.
    pub fn raw_payload(&self) -> &[u8] {
        &self.raw_payload
    }

    /// The driver-private receipt.
    pub fn handle(&self) -> &DeliveryHandle {
        &self.handle
    }

    /// Which delivery attempt this is (starts at 1).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether this delivery has been seen before.
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Which consumption side produced an envelope. Lets pipeline receivers
/// request queue- vs topic-specific handling from the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Popped from a queue.
    Queue,
    /// Delivered by a topic subscription.
    Topic,
}

/// A delivery travelling through one receiver-pipeline pass, together with
/// its completion operations.
///
/// An envelope is terminal once settled: the first `acknowledge` or `reject`
/// wins and every later settlement call is a no-op, because network
/// redelivery can cause overlapping completions.
pub struct Envelope {
    delivery: QueuedMessage,
    kind: EnvelopeKind,
    settler: Option<Arc<dyn QueueDriver>>,
    settled: bool,
}

impl Envelope {
    /// Wrap a queue delivery with the driver it came from.
    pub fn queue(delivery: QueuedMessage, driver: Arc<dyn QueueDriver>) -> Self {
        Self {
            delivery,
            kind: EnvelopeKind::Queue,
            settler: Some(driver),
            settled: false,
        }
    }

    /// Wrap a topic delivery. Emulated topics settle against the queue
    /// driver underneath; native auto-acknowledging transports pass `None`
    /// and settlement becomes a no-op.
    pub fn topic(delivery: QueuedMessage, settler: Option<Arc<dyn QueueDriver>>) -> Self {
        Self {
            delivery,
            kind: EnvelopeKind::Topic,
            settler,
            settled: false,
        }
    }

    /// The delivery inside.
    pub fn delivery(&self) -> &QueuedMessage {
        &self.delivery
    }

    /// Mutable access to the delivery inside.
    pub fn delivery_mut(&mut self) -> &mut QueuedMessage {
        &mut self.delivery
    }

    /// Shorthand for the decoded message.
    pub fn message(&self) -> &Message {
        self.delivery.message()
    }

    /// Shorthand for mutable access to the decoded message.
    pub fn message_mut(&mut self) -> &mut Message {
        self.delivery.message_mut()
    }

    /// Which consumption side produced this envelope.
    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    /// Whether the envelope has already been settled.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Mark the delivery permanently consumed.
    pub async fn acknowledge(&mut self) -> Result<(), CourierError> {
        if self.settled {
            return Ok(());
        }
        if let Some(driver) = &self.settler {
            driver.acknowledge(&self.delivery).await?;
        }
        self.settled = true;
        Ok(())
    }

    /// Return the delivery to availability (`requeue = true`) or drop it
    /// (`requeue = false`; dropping removes it from the transport exactly
    /// like consumption).
    pub async fn reject(&mut self, requeue: bool) -> Result<(), CourierError> {
        if self.settled {
            return Ok(());
        }
        if let Some(driver) = &self.settler {
            if requeue {
                driver.release(&self.delivery).await?;
            } else {
                driver.acknowledge(&self.delivery).await?;
            }
        }
        self.settled = true;
        Ok(())
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("kind", &self.kind)
            .field("handle", self.delivery.handle())
            .field("attempt", &self.delivery.attempt())
            .field("settled", &self.settled)
            .finish()
    }
}
