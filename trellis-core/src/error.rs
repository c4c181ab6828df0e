//! Trellis error types.
//!
//! Two scopes of failure exist and they never mix:
//! - socket-level faults are fatal to the owning connection
//! - protocol-level faults (timeout, cancel, unknown id) belong to one request

use std::io;
use thiserror::Error;

use crate::connection::ConnectionState;
use crate::correlation::CorrelationId;
use crate::endpoint::EndpointError;

/// Main error type for Trellis operations
#[derive(Error, Debug)]
pub enum TrellisError {
    /// Fatal socket error while reading or writing
    #[error("Socket error: {0}")]
    Socket(#[from] io::Error),

    /// Binding an endpoint failed
    #[error("Listen on {endpoint} failed: {source}")]
    Listen {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Connecting an endpoint failed
    #[error("Connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Endpoint address could not be parsed
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// Operation not allowed in the connection's current state
    #[error("Connection is {0}")]
    InvalidState(ConnectionState),

    /// A message needs at least one frame
    #[error("Message has no frames")]
    EmptyMessage,

    /// Inbound message does not follow the expected envelope layout
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Inbound message exceeded the configured size limit
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// No reply arrived before the request deadline
    #[error("Request {0} timed out")]
    RequestTimeout(CorrelationId),

    /// The caller cancelled the request
    #[error("Request {0} cancelled")]
    Cancelled(CorrelationId),

    /// `reply()` called for an id without a stored routing envelope
    #[error("Unknown correlation id {0}")]
    UnknownCorrelationId(CorrelationId),

    /// The connection went away while the request was pending
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias for Trellis operations
pub type Result<T> = std::result::Result<T, TrellisError>;

impl TrellisError {
    /// Create a malformed message error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }

    /// Create a listen error for an endpoint address
    pub fn listen(endpoint: impl Into<String>, source: io::Error) -> Self {
        Self::Listen {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Create a connect error for an endpoint address
    pub fn connect(endpoint: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Check if this error is scoped to a single request
    #[must_use]
    pub const fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout(_) | Self::Cancelled(_) | Self::UnknownCorrelationId(_)
        )
    }

    /// Check if this error tears down the owning connection
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Socket(_) | Self::MessageTooLarge { .. })
    }

    /// The correlation id carried by a request-scoped error
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            Self::RequestTimeout(id) | Self::Cancelled(id) | Self::UnknownCorrelationId(id) => {
                Some(id)
            }
            _ => None,
        }
    }
}

/// Returns true for the "try again later" outcome of a non-blocking call.
#[inline]
pub fn is_would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_request_scoped_errors() {
        let id = CorrelationId::new(Bytes::from_static(b"\x01\x02"));
        assert!(TrellisError::RequestTimeout(id.clone()).is_request_scoped());
        assert!(TrellisError::Cancelled(id.clone()).is_request_scoped());
        assert!(TrellisError::UnknownCorrelationId(id).is_request_scoped());
        assert!(!TrellisError::ConnectionClosed.is_request_scoped());
    }

    #[test]
    fn test_socket_errors_are_fatal() {
        let err = TrellisError::from(io::Error::other("boom"));
        assert!(err.is_connection_fatal());
        assert!(!err.is_request_scoped());
        assert!(err.correlation_id().is_none());
    }

    #[test]
    fn test_display_carries_hex_id() {
        let id = CorrelationId::new(Bytes::from_static(b"\xab\xcd"));
        let err = TrellisError::RequestTimeout(id);
        assert_eq!(err.to_string(), "Request abcd timed out");
    }

    #[test]
    fn test_would_block_detection() {
        assert!(is_would_block(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_would_block(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }
}
