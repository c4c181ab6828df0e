//! Endpoint abstraction: where a connection binds or connects.
//!
//! An [`Endpoint`] pairs an [`EndpointKind`] with a libzmq-style address.
//! The address is kept verbatim (the socket library interprets it) but can
//! be classified into a [`Transport`] for validation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Whether a connection binds or connects an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Listen on the address (`zmq_bind`)
    Bind,
    /// Connect to the address (`zmq_connect`)
    Connect,
}

impl EndpointKind {
    /// Get the kind as a lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Connect => "connect",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bind or connect target of a connection.
///
/// # Examples
///
/// ```
/// use trellis_core::endpoint::{Endpoint, EndpointKind, Transport};
///
/// let endpoint = Endpoint::bind("inproc://test");
/// assert_eq!(endpoint.kind(), EndpointKind::Bind);
/// assert!(matches!(endpoint.transport().unwrap(), Transport::Inproc(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    kind: EndpointKind,
    address: String,
}

impl Endpoint {
    /// Create an endpoint of the given kind.
    pub fn new(kind: EndpointKind, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
        }
    }

    /// Create a bind endpoint.
    pub fn bind(address: impl Into<String>) -> Self {
        Self::new(EndpointKind::Bind, address)
    }

    /// Create a connect endpoint.
    pub fn connect(address: impl Into<String>) -> Self {
        Self::new(EndpointKind::Connect, address)
    }

    /// Bind or connect.
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// The raw address string.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Classify the address by transport scheme.
    pub fn transport(&self) -> Result<Transport, EndpointError> {
        self.address.parse()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.address)
    }
}

/// Transport scheme of an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transport {
    /// TCP transport: `tcp://host:port` (host may be `*` or an interface)
    Tcp(String),
    /// IPC transport (Unix domain socket): `ipc:///path/to/socket`
    Ipc(PathBuf),
    /// In-process transport: `inproc://name`
    Inproc(String),
    /// Reliable multicast: `pgm://interface;group:port`
    Pgm(String),
    /// Encapsulated reliable multicast over UDP: `epgm://interface;group:port`
    Epgm(String),
}

impl Transport {
    /// Returns true if this is a multicast transport.
    pub fn is_multicast(&self) -> bool {
        matches!(self, Transport::Pgm(_) | Transport::Epgm(_))
    }
}

impl FromStr for Transport {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && !port.is_empty() => {
                    Ok(Transport::Tcp(addr.to_string()))
                }
                _ => Err(EndpointError::InvalidTcpAddress(addr.to_string())),
            }
        } else if let Some(path) = s.strip_prefix("ipc://") {
            if path.is_empty() {
                Err(EndpointError::EmptyName("ipc".to_string()))
            } else {
                Ok(Transport::Ipc(PathBuf::from(path)))
            }
        } else if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                Err(EndpointError::EmptyName("inproc".to_string()))
            } else {
                Ok(Transport::Inproc(name.to_string()))
            }
        } else if let Some(addr) = s.strip_prefix("pgm://") {
            Ok(Transport::Pgm(addr.to_string()))
        } else if let Some(addr) = s.strip_prefix("epgm://") {
            Ok(Transport::Epgm(addr.to_string()))
        } else {
            Err(EndpointError::InvalidScheme(s.to_string()))
        }
    }
}

/// Errors that can occur when classifying endpoint addresses.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp://, ipc://, inproc://, pgm:// or epgm://)")]
    InvalidScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),

    #[error("Empty {0} endpoint name")]
    EmptyName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_connect_constructors() {
        let bind = Endpoint::bind("tcp://127.0.0.1:5555");
        let connect = Endpoint::connect("tcp://127.0.0.1:5555");
        assert_eq!(bind.kind(), EndpointKind::Bind);
        assert_eq!(connect.kind(), EndpointKind::Connect);
        assert_eq!(bind.address(), connect.address());
        assert_ne!(bind, connect);
        assert_eq!(bind.to_string(), "bind tcp://127.0.0.1:5555");
    }

    #[test]
    fn test_parse_tcp() {
        let endpoint = Endpoint::bind("tcp://*:5555");
        assert_eq!(
            endpoint.transport().unwrap(),
            Transport::Tcp("*:5555".to_string())
        );
        let endpoint = Endpoint::connect("tcp://[::1]:5555");
        assert!(matches!(endpoint.transport().unwrap(), Transport::Tcp(_)));
    }

    #[test]
    fn test_parse_ipc() {
        let endpoint = Endpoint::bind("ipc:///tmp/test.sock");
        assert_eq!(
            endpoint.transport().unwrap(),
            Transport::Ipc(PathBuf::from("/tmp/test.sock"))
        );
    }

    #[test]
    fn test_parse_multicast() {
        let transport: Transport = "epgm://eth0;239.192.1.1:5555".parse().unwrap();
        assert!(transport.is_multicast());
        let transport: Transport = "inproc://x".parse().unwrap();
        assert!(!transport.is_multicast());
    }

    #[test]
    fn test_invalid_scheme() {
        let result = Endpoint::connect("http://127.0.0.1:5555").transport();
        assert!(matches!(result, Err(EndpointError::InvalidScheme(_))));
    }

    #[test]
    fn test_invalid_tcp_address() {
        let result = Endpoint::connect("tcp://localhost").transport();
        assert!(matches!(result, Err(EndpointError::InvalidTcpAddress(_))));
    }

    #[test]
    fn test_invalid_inproc_empty() {
        let result = Endpoint::bind("inproc://").transport();
        assert!(matches!(result, Err(EndpointError::EmptyName(_))));
    }
}
