//! libzmq-backed socket library (feature `libzmq`).
//!
//! Thin adapter from the `zmq` crate to [`SocketContext`]/[`RawSocket`].
//! Every send and receive passes `DONTWAIT`; `EAGAIN` surfaces as
//! `io::ErrorKind::WouldBlock`.

use bytes::Bytes;
use std::cell::RefCell;
use std::io;
use tracing::debug;

use crate::socket::{Descriptor, RawSocket, Readiness, SocketContext, SocketOption};
use crate::socket_type::SocketType;

fn to_io(err: zmq::Error) -> io::Error {
    let kind = match err {
        zmq::Error::EAGAIN => io::ErrorKind::WouldBlock,
        zmq::Error::EADDRINUSE => io::ErrorKind::AddrInUse,
        zmq::Error::EINVAL | zmq::Error::EPROTONOSUPPORT => io::ErrorKind::InvalidInput,
        zmq::Error::ENOTSUP => io::ErrorKind::Unsupported,
        zmq::Error::ENOTSOCK | zmq::Error::ETERM => io::ErrorKind::NotConnected,
        zmq::Error::ECONNREFUSED => io::ErrorKind::ConnectionRefused,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

fn zmq_type(socket_type: SocketType) -> zmq::SocketType {
    match socket_type {
        SocketType::Pair => zmq::PAIR,
        SocketType::Pub => zmq::PUB,
        SocketType::Sub => zmq::SUB,
        SocketType::Req => zmq::REQ,
        SocketType::Rep => zmq::REP,
        SocketType::Dealer => zmq::DEALER,
        SocketType::Router => zmq::ROUTER,
        SocketType::Pull => zmq::PULL,
        SocketType::Push => zmq::PUSH,
    }
}

/// A libzmq context.
pub struct ZmqContext {
    context: RefCell<zmq::Context>,
}

impl ZmqContext {
    /// Create a fresh libzmq context.
    pub fn new() -> Self {
        Self {
            context: RefCell::new(zmq::Context::new()),
        }
    }
}

impl Default for ZmqContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketContext for ZmqContext {
    fn create_socket(&self, socket_type: SocketType) -> io::Result<Box<dyn RawSocket>> {
        let socket = self
            .context
            .borrow()
            .socket(zmq_type(socket_type))
            .map_err(to_io)?;
        Ok(Box::new(ZmqSocket {
            socket: Some(socket),
            socket_type,
        }))
    }

    fn terminate(&self) -> io::Result<()> {
        debug!("[LIBZMQ] Terminating context");
        self.context.borrow_mut().destroy().map_err(to_io)
    }
}

/// A libzmq socket driven in non-blocking mode.
pub struct ZmqSocket {
    socket: Option<zmq::Socket>,
    socket_type: SocketType,
}

impl ZmqSocket {
    fn inner(&self) -> io::Result<&zmq::Socket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket closed"))
    }
}

impl RawSocket for ZmqSocket {
    fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        let socket = self.inner()?;
        let result = match option {
            SocketOption::Linger(linger) => {
                socket.set_linger(i32::try_from(linger.as_millis()).unwrap_or(i32::MAX))
            }
            SocketOption::MulticastLoop(enabled) => {
                // ZMQ_MCAST_LOOP was removed in libzmq 3.
                debug!(enabled, "[LIBZMQ] Multicast loop is not configurable");
                Ok(())
            }
            SocketOption::Rate(rate) => socket.set_rate(rate),
            SocketOption::HighWaterMark(hwm) => socket
                .set_sndhwm(hwm)
                .and_then(|()| socket.set_rcvhwm(hwm)),
            SocketOption::Identity(identity) => socket.set_identity(&identity),
            SocketOption::Subscribe(prefix) => socket.set_subscribe(&prefix),
            SocketOption::Unsubscribe(prefix) => socket.set_unsubscribe(&prefix),
        };
        result.map_err(to_io)
    }

    fn bind(&mut self, address: &str) -> io::Result<()> {
        self.inner()?.bind(address).map_err(to_io)
    }

    fn connect(&mut self, address: &str) -> io::Result<()> {
        self.inner()?.connect(address).map_err(to_io)
    }

    fn send_frame(&mut self, frame: &Bytes, more: bool) -> io::Result<()> {
        let flags = if more {
            zmq::DONTWAIT | zmq::SNDMORE
        } else {
            zmq::DONTWAIT
        };
        self.inner()?.send(&frame[..], flags).map_err(to_io)
    }

    fn recv_frame(&mut self) -> io::Result<Bytes> {
        self.inner()?
            .recv_bytes(zmq::DONTWAIT)
            .map(Bytes::from)
            .map_err(to_io)
    }

    fn recv_more(&self) -> io::Result<bool> {
        self.inner()?.get_rcvmore().map_err(to_io)
    }

    fn readiness(&mut self) -> io::Result<Readiness> {
        let events = self.inner()?.get_events().map_err(to_io)?;
        Ok(Readiness {
            readable: events.contains(zmq::POLLIN),
            writable: events.contains(zmq::POLLOUT),
        })
    }

    fn descriptor(&self) -> io::Result<Descriptor> {
        let fd = self.inner()?.get_fd().map_err(to_io)?;
        Ok(Descriptor(fd as u64))
    }

    fn close(&mut self) -> io::Result<()> {
        match self.socket.take() {
            Some(socket) => {
                drop(socket);
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed")),
        }
    }
}
