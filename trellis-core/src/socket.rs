//! Interface to the messaging socket library.
//!
//! Connections never talk to a concrete library. They drive a [`RawSocket`]
//! created by a [`SocketContext`]:
//! - every send/receive is non-blocking and reports "try again later" as
//!   `io::ErrorKind::WouldBlock`
//! - multipart boundaries are expressed with a per-frame `more` flag
//! - readiness is read from a bitmask ([`Readiness`]), the descriptor only
//!   signals that the bitmask may have changed (edge-triggered)

use bytes::Bytes;
use std::fmt;
use std::io;
use std::time::Duration;

use crate::socket_type::SocketType;

/// Identifier of the readiness source an event loop watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor(pub u64);

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

/// Readiness bitmask (`ZMQ_EVENTS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// At least one frame can be received without blocking (POLLIN)
    pub readable: bool,
    /// At least one message can be sent without blocking (POLLOUT)
    pub writable: bool,
}

impl Readiness {
    /// Neither readable nor writable.
    pub const NONE: Readiness = Readiness {
        readable: false,
        writable: false,
    };
}

/// A socket option understood by the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOption {
    /// Time to keep unsent messages after close (ZMQ_LINGER)
    Linger(Duration),
    /// Loop multicast back to the local host (ZMQ_MCAST_LOOP)
    MulticastLoop(bool),
    /// Multicast data rate in kbps (ZMQ_RATE)
    Rate(i32),
    /// Per-peer queue limit, 0 = unlimited (ZMQ_SNDHWM + ZMQ_RCVHWM)
    HighWaterMark(i32),
    /// Routing identity announced to peers (ZMQ_IDENTITY)
    Identity(Bytes),
    /// Add a topic prefix filter (ZMQ_SUBSCRIBE)
    Subscribe(Bytes),
    /// Remove a topic prefix filter (ZMQ_UNSUBSCRIBE)
    Unsubscribe(Bytes),
}

/// One native non-blocking socket.
///
/// Single-threaded access only: a socket is driven from the event-loop
/// thread that owns its connection.
pub trait RawSocket {
    /// The pattern this socket implements.
    fn socket_type(&self) -> SocketType;

    /// Apply an option.
    fn set_option(&mut self, option: SocketOption) -> io::Result<()>;

    /// Listen on an address.
    fn bind(&mut self, address: &str) -> io::Result<()>;

    /// Connect to an address.
    fn connect(&mut self, address: &str) -> io::Result<()>;

    /// Send one frame without blocking; `more` marks a non-final frame.
    fn send_frame(&mut self, frame: &Bytes, more: bool) -> io::Result<()>;

    /// Receive one frame without blocking.
    fn recv_frame(&mut self) -> io::Result<Bytes>;

    /// Whether the last received frame has a successor (ZMQ_RCVMORE).
    fn recv_more(&self) -> io::Result<bool>;

    /// Current readiness bitmask.
    ///
    /// Reading the bitmask may let the library process pending peer events,
    /// hence `&mut self`.
    fn readiness(&mut self) -> io::Result<Readiness>;

    /// Descriptor to register with the event loop.
    fn descriptor(&self) -> io::Result<Descriptor>;

    /// Close the socket. Further calls fail.
    fn close(&mut self) -> io::Result<()>;
}

/// Factory for sockets sharing one library context.
pub trait SocketContext {
    /// Create a socket of the given type.
    fn create_socket(&self, socket_type: SocketType) -> io::Result<Box<dyn RawSocket>>;

    /// Terminate the context. Sockets must be closed first.
    fn terminate(&self) -> io::Result<()>;
}
