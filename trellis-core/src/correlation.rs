//! Correlation ids tagging one outstanding request on the wire.

use bytes::Bytes;
use std::fmt;

/// Opaque token matching a reply to its originating request.
///
/// Travels as a single frame, so any byte string is a valid id. The default
/// generator produces 16 random bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(Bytes);

impl CorrelationId {
    /// Wrap raw frame bytes as an id.
    #[must_use]
    pub const fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Build an id from a 128-bit value.
    #[must_use]
    pub fn from_u128(value: u128) -> Self {
        Self(Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    /// The on-the-wire frame.
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Consume the id, returning its frame.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for CorrelationId {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<&'static str> for CorrelationId {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<CorrelationId> for Bytes {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", hex::encode(&self.0))
    }
}
