//! The outbound message unit.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying the correlation id of a request/reply exchange.
pub const HEADER_CORRELATION_ID: &str = "correlation_id";

/// Header naming the queue a reply should be pushed to.
pub const HEADER_REPLY_TO: &str = "reply_to";

/// Header carrying the partition key for partitioned transports.
pub const HEADER_PARTITION_KEY: &str = "partition_key";

/// Header carrying the priority for transports that order by it.
pub const HEADER_PRIORITY: &str = "priority";

/// Header carrying the time-to-run budget in seconds.
pub const HEADER_TTR: &str = "ttr";

/// Outbound unit of work.
///
/// A message is built by the producer, mutated freely, and consumed by value
/// when handed to a destination or driver. The payload is arbitrary JSON;
/// a binder on the consuming side may rewrite it into a typed shape.
///
/// # Example
///
/// ```rust
/// use courier::Message;
/// use std::time::Duration;
///
/// let message = Message::new(serde_json::json!({"to": "user@example.com"}))
///     .with_handler("send_email")
///     .with_destination("emails")
///     .with_delay(Duration::from_secs(30))
///     .with_max_tries(5);
///
/// assert_eq!(message.handler(), Some("send_email"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Handler/job reference resolved on the consuming side.
    handler: Option<String>,

    /// Arbitrary payload data.
    data: serde_json::Value,

    /// Queue or topic name the message is addressed to.
    destination: Option<String>,

    /// Seconds before the message becomes visible.
    delay_secs: Option<u64>,

    /// Delivery attempts allowed before the message is dropped.
    max_tries: Option<u32>,

    /// String-keyed metadata bag (correlation id, reply-to, priority, ...).
    headers: HashMap<String, String>,

    /// Skip durable storage where the transport distinguishes it.
    no_store: bool,

    /// The sender expects a correlated reply.
    needs_reply: bool,

    /// When the message was created.
    created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message carrying the given payload data.
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            handler: None,
            data,
            destination: None,
            delay_secs: None,
            max_tries: None,
            headers: HashMap::new(),
            no_store: false,
            needs_reply: false,
            created_at: Utc::now(),
        }
    }

    /// Create an empty message (null payload).
    pub fn empty() -> Self {
        Self::new(serde_json::Value::Null)
    }

    /// Set the handler/job reference.
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Set the destination (queue or topic name).
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Set the visibility delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_secs = Some(delay.as_secs());
        self
    }

    /// Set the maximum delivery attempts.
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    /// Set a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Mark the message as not-to-be-stored.
    pub fn with_no_store(mut self, no_store: bool) -> Self {
        self.no_store = no_store;
        self
    }

    /// Mark the message as expecting a correlated reply.
    pub fn with_reply(mut self) -> Self {
        self.needs_reply = true;
        self
    }

    /// Handler/job reference, if any.
    pub fn handler(&self) -> Option<&str> {
        self.handler.as_deref()
    }

    /// Payload data.
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Replace the payload data in place. Used by binders after recognizing
    /// the message's declared shape.
    pub fn set_data(&mut self, data: serde_json::Value) {
        self.data = data;
    }

    /// Destination name, if set.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Address the message to a destination.
    pub fn set_destination(&mut self, destination: impl Into<String>) {
        self.destination = Some(destination.into());
    }

    /// Visibility delay, if any.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_secs.map(Duration::from_secs)
    }

    /// Maximum delivery attempts, if set.
    pub fn max_tries(&self) -> Option<u32> {
        self.max_tries
    }

    /// Read a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Write a header value.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// The full header bag.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Whether the message should skip durable storage.
    pub fn no_store(&self) -> bool {
        self.no_store
    }

    /// Whether the sender expects a correlated reply.
    pub fn needs_reply(&self) -> bool {
        self.needs_reply
    }

    /// When the message was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Correlation id header, if present.
    pub fn correlation_id(&self) -> Option<&str> {
        self.header(HEADER_CORRELATION_ID)
    }

    /// Reply-to header, if present.
    pub fn reply_to(&self) -> Option<&str> {
        self.header(HEADER_REPLY_TO)
    }

    /// Generate a short random correlation token.
    pub fn generate_correlation_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let message = Message::new(serde_json::json!({"n": 1}))
            .with_handler("handle")
            .with_destination("jobs")
            .with_delay(Duration::from_secs(10))
            .with_max_tries(2)
            .with_header(HEADER_PRIORITY, "3")
            .with_no_store(true);

        assert_eq!(message.handler(), Some("handle"));
        assert_eq!(message.destination(), Some("jobs"));
        assert_eq!(message.delay(), Some(Duration::from_secs(10)));
        assert_eq!(message.max_tries(), Some(2));
        assert_eq!(message.header(HEADER_PRIORITY), Some("3"));
        assert!(message.no_store());
        assert!(!message.needs_reply());
    }

    #[test]
    fn test_reply_headers() {
        let mut message = Message::empty().with_reply();
        assert!(message.needs_reply());
        assert_eq!(message.correlation_id(), None);

        message.set_header(HEADER_CORRELATION_ID, "abc123");
        message.set_header(HEADER_REPLY_TO, "jobs_reply");
        assert_eq!(message.correlation_id(), Some("abc123"));
        assert_eq!(message.reply_to(), Some("jobs_reply"));
    }

    #[test]
    fn test_set_data_replaces_payload() {
        let mut message = Message::new(serde_json::json!({"raw": true}));
        message.set_data(serde_json::json!({"bound": true}));
        assert_eq!(message.data()["bound"], true);
    }

    #[test]
    fn test_serde_round_trip() {
        let message = Message::new(serde_json::json!([1, 2, 3])).with_destination("q");
        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_correlation_token_shape() {
        let token = Message::generate_correlation_id();
        assert_eq!(token.len(), 32);
        assert_ne!(token, Message::generate_correlation_id());
    }
}
