//! Socket configuration options
//!
//! This module provides configuration for the sockets a connection creates,
//! mirroring the libzmq options (`zmq_setsockopt`) the connection applies at
//! construction time.

use bytes::Bytes;
use std::time::Duration;

use crate::socket::SocketOption;

/// Default multicast data rate (kilobits per second).
pub const DEFAULT_MULTICAST_RATE: i32 = 100;

/// Socket configuration options.
///
/// # Examples
///
/// ```
/// use trellis_core::options::SocketOptions;
///
/// let opts = SocketOptions::default()
///     .with_identity("client")
///     .with_high_water_mark(1000);
/// assert_eq!(opts.high_water_mark, 1000);
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Loop multicast traffic back to the sending host (ZMQ_MCAST_LOOP)
    ///
    /// - Default: false
    pub multicast_loop: bool,

    /// Maximum multicast data rate in kbps (ZMQ_RATE)
    ///
    /// - Default: 100
    pub multicast_rate: i32,

    /// High water mark (ZMQ_SNDHWM / ZMQ_RCVHWM)
    ///
    /// Hard limit on outstanding messages queued in the socket library for
    /// any single peer.
    /// - Default: 0 (no limit)
    pub high_water_mark: i32,

    /// Socket identity / routing ID (ZMQ_IDENTITY)
    ///
    /// - Default: None (library assigns one)
    pub identity: Option<Bytes>,

    /// Maximum inbound message size in bytes
    ///
    /// Enforced by the connection while assembling frames.
    /// - `None`: No limit (default)
    pub max_msg_size: Option<usize>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            multicast_loop: false,
            multicast_rate: DEFAULT_MULTICAST_RATE,
            high_water_mark: 0,
            identity: None,
            max_msg_size: None,
        }
    }
}

impl SocketOptions {
    /// Create new socket options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow loopback of multicast traffic.
    pub fn with_multicast_loop(mut self, enabled: bool) -> Self {
        self.multicast_loop = enabled;
        self
    }

    /// Set the multicast data rate (kbps).
    pub fn with_multicast_rate(mut self, rate: i32) -> Self {
        self.multicast_rate = rate;
        self
    }

    /// Set the high water mark (0 = unlimited).
    pub fn with_high_water_mark(mut self, hwm: i32) -> Self {
        self.high_water_mark = hwm;
        self
    }

    /// Set the socket identity.
    pub fn with_identity(mut self, identity: impl Into<Bytes>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Cap inbound message size.
    pub fn with_max_msg_size(mut self, size: usize) -> Self {
        self.max_msg_size = Some(size);
        self
    }

    /// Options to apply to a freshly created socket, in application order.
    ///
    /// `linger` comes from the registry, not from per-socket options.
    pub fn socket_options(&self, linger: Duration) -> Vec<SocketOption> {
        let mut opts = vec![
            SocketOption::Linger(linger),
            SocketOption::MulticastLoop(self.multicast_loop),
            SocketOption::Rate(self.multicast_rate),
            SocketOption::HighWaterMark(self.high_water_mark),
        ];
        if let Some(identity) = &self.identity {
            opts.push(SocketOption::Identity(identity.clone()));
        }
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SocketOptions::default();
        assert!(!opts.multicast_loop);
        assert_eq!(opts.multicast_rate, 100);
        assert_eq!(opts.high_water_mark, 0);
        assert!(opts.identity.is_none());
        assert!(opts.max_msg_size.is_none());
    }

    #[test]
    fn test_socket_options_order() {
        let opts = SocketOptions::new().with_identity("service");
        let applied = opts.socket_options(Duration::from_millis(100));
        assert_eq!(applied.len(), 5);
        assert_eq!(applied[0], SocketOption::Linger(Duration::from_millis(100)));
        assert_eq!(
            applied[4],
            SocketOption::Identity(Bytes::from_static(b"service"))
        );
    }

    #[test]
    fn test_identity_is_optional() {
        let applied = SocketOptions::new().socket_options(Duration::ZERO);
        assert!(!applied
            .iter()
            .any(|o| matches!(o, SocketOption::Identity(_))));
    }
}
