//! Error types for the messaging runtime.
//!
//! Driver-level connection errors propagate to the caller of
//! push/pop/publish/consume; the core never swallows or auto-retries them.
//! Retry policy belongs to the receiver pipeline (`RetryReceiver`), layered
//! on top of the consumer loop.

use thiserror::Error;

/// Errors surfaced by drivers and the consumption core.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Transport connection could not be established (often misconfiguration).
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Established connection dropped mid-operation.
    #[error("connection lost: {message}")]
    ConnectionLost {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport-side failure. Not retried by the core.
    #[error("server error: {0}")]
    Server(String),

    /// Payload could not be encoded or decoded. The delivery is left in
    /// place for manual inspection.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No handler resolvable for a message. Logged by the consumer loop,
    /// which keeps running.
    #[error("no processor for message: {0}")]
    ProcessorNotFound(String),

    /// The driver does not implement an optional capability
    /// (reserve/peek/count/manage). Probe capabilities before use.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A reply-required message was sent to a destination with no single
    /// reply address (multi-queue or multi-topic).
    #[error("destination cannot carry a reply: {0}")]
    ReplyNotSupported(String),
}

impl CourierError {
    /// Create a connection-failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection-failed error with a source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection-lost error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
            source: None,
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported(operation.into())
    }

    /// Check if this is a connection-level error (failed or lost).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            CourierError::ConnectionFailed { .. } | CourierError::ConnectionLost { .. }
        )
    }

    /// Check if this is a missing-capability error.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CourierError::Unsupported(_))
    }

    /// Check if this is a payload decoding error.
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, CourierError::Serialization(_))
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(CourierError::connection_failed("refused").is_connection_error());
        assert!(CourierError::connection_lost("reset").is_connection_error());
        assert!(!CourierError::server("boom").is_connection_error());

        assert!(CourierError::unsupported("count").is_unsupported());
        assert!(CourierError::serialization("bad json").is_serialization_error());
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CourierError = err.into();
        assert!(err.is_serialization_error());
    }

    #[test]
    fn test_display() {
        let err = CourierError::ReplyNotSupported("queue-a,queue-b".to_string());
        assert!(err.to_string().contains("cannot carry a reply"));
    }
}
