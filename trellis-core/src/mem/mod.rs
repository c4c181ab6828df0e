//! In-memory socket library.
//!
//! `MemContext` implements [`SocketContext`] without any native dependency.
//! Sockets created from the same context reach each other by address: the
//! address string is only a key in the context's endpoint table, so
//! `tcp://127.0.0.1:5555`, `ipc:///tmp/x` and `inproc://x` all behave alike.
//!
//! Supported patterns: PAIR, PUB, SUB, DEALER, ROUTER, PUSH, PULL. Each link
//! between two sockets is a pair of `flume` channels whose capacity is the
//! sending side's high water mark.
//!
//! Unlike libzmq, an address must be bound before anyone connects to it.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use trellis_core::mem::MemContext;
//! use trellis_core::socket::SocketContext;
//! use trellis_core::socket_type::SocketType;
//!
//! let ctx = MemContext::new();
//! let mut pull = ctx.create_socket(SocketType::Pull).unwrap();
//! let mut push = ctx.create_socket(SocketType::Push).unwrap();
//! pull.bind("inproc://jobs").unwrap();
//! push.connect("inproc://jobs").unwrap();
//!
//! push.send_frame(&Bytes::from_static(b"job"), false).unwrap();
//! assert_eq!(pull.recv_frame().unwrap(), "job");
//! ```

mod pipe;
mod socket;
pub mod subscription;

pub use pipe::{MemMessage, SharedFilter};
pub use socket::MemSocket;

use bytes::{BufMut, Bytes, BytesMut};
use dashmap::DashMap;
use flume::Sender;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::socket::{RawSocket, SocketContext};
use crate::socket_type::SocketType;

/// Connecting side's half of a new link, handed to the binder.
pub(crate) struct PeerLink {
    pub(crate) tx: Sender<MemMessage>,
    pub(crate) rx: flume::Receiver<MemMessage>,
    pub(crate) identity: Bytes,
    pub(crate) socket_type: SocketType,
    pub(crate) filter: SharedFilter,
}

/// What a connecting socket needs to know about a bound address.
#[derive(Clone)]
pub(crate) struct BoundEndpoint {
    pub(crate) owner: u64,
    pub(crate) accept: Sender<PeerLink>,
    pub(crate) identity: Bytes,
    pub(crate) socket_type: SocketType,
    pub(crate) hwm: usize,
    pub(crate) filter: SharedFilter,
}

pub(crate) struct ContextShared {
    pub(crate) endpoints: DashMap<String, BoundEndpoint>,
    next_descriptor: AtomicU64,
    next_identity: AtomicU32,
    terminated: AtomicBool,
}

impl ContextShared {
    pub(crate) fn next_descriptor(&self) -> u64 {
        self.next_descriptor.fetch_add(1, Ordering::Relaxed)
    }

    /// Identity for a peer that did not set one: a zero byte then a
    /// big-endian counter, like libzmq.
    pub(crate) fn generate_identity(&self) -> Bytes {
        let n = self.next_identity.fetch_add(1, Ordering::Relaxed);
        let mut id = BytesMut::with_capacity(5);
        id.put_u8(0);
        id.put_u32(n);
        id.freeze()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

/// Shared handle to an in-memory socket library instance.
///
/// Cloning shares the endpoint table.
#[derive(Clone)]
pub struct MemContext {
    shared: Arc<ContextShared>,
}

impl MemContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ContextShared {
                endpoints: DashMap::new(),
                next_descriptor: AtomicU64::new(3),
                next_identity: AtomicU32::new(1),
                terminated: AtomicBool::new(false),
            }),
        }
    }

    /// Addresses currently bound in this context.
    pub fn bound_endpoints(&self) -> Vec<String> {
        self.shared
            .endpoints
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Whether [`terminate`](SocketContext::terminate) was called.
    pub fn is_terminated(&self) -> bool {
        self.shared.is_terminated()
    }
}

impl Default for MemContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemContext")
            .field("endpoints", &self.shared.endpoints.len())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl SocketContext for MemContext {
    fn create_socket(&self, socket_type: SocketType) -> io::Result<Box<dyn RawSocket>> {
        if self.shared.is_terminated() {
            return Err(io::Error::other("context terminated"));
        }
        if matches!(socket_type, SocketType::Req | SocketType::Rep) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{socket_type} sockets are not available in memory"),
            ));
        }
        Ok(Box::new(MemSocket::new(self.shared.clone(), socket_type)))
    }

    fn terminate(&self) -> io::Result<()> {
        debug!("[MEM] Terminating context");
        self.shared.terminated.store(true, Ordering::Release);
        self.shared.endpoints.clear();
        Ok(())
    }
}
