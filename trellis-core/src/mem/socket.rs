//! In-memory socket implementing the routing rules of each pattern.

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use flume::{Receiver, Sender};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tracing::{debug, trace};

use super::pipe::{self, MemMessage, Offer, Pipe, Poll, SharedFilter};
use super::{BoundEndpoint, ContextShared, PeerLink};
use crate::socket::{Descriptor, RawSocket, Readiness, SocketOption};
use crate::socket_type::SocketType;

/// Where the message being sent goes.
enum Route {
    /// Next pipe in round-robin order (index into `pipes`)
    Pipe(usize),
    /// ROUTER: the pipe whose peer has this identity
    Peer(Bytes),
    /// PUB: every subscribed peer
    Fanout,
}

/// A socket of one [`SocketType`] living in a [`MemContext`](super::MemContext).
pub struct MemSocket {
    shared: Arc<ContextShared>,
    socket_type: SocketType,
    descriptor: Descriptor,
    identity: Option<Bytes>,
    hwm: usize,
    filter: SharedFilter,
    accept_tx: Sender<PeerLink>,
    accept_rx: Receiver<PeerLink>,
    bound: Vec<String>,
    pipes: Vec<Pipe>,
    send_cursor: usize,
    recv_cursor: usize,
    staged: Vec<Bytes>,
    route: Option<Route>,
    inbound: VecDeque<Bytes>,
    closed: bool,
}

impl MemSocket {
    pub(crate) fn new(shared: Arc<ContextShared>, socket_type: SocketType) -> Self {
        let descriptor = Descriptor(shared.next_descriptor());
        let (accept_tx, accept_rx) = flume::unbounded();
        Self {
            shared,
            socket_type,
            descriptor,
            identity: None,
            hwm: 0,
            filter: SharedFilter::default(),
            accept_tx,
            accept_rx,
            bound: Vec::new(),
            pipes: Vec::new(),
            send_cursor: 0,
            recv_cursor: 0,
            staged: Vec::new(),
            route: None,
            inbound: VecDeque::new(),
            closed: false,
        }
    }

    /// Number of live peer links.
    pub fn peer_count(&self) -> usize {
        self.pipes.len()
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }
        if self.shared.is_terminated() {
            return Err(io::Error::other("context terminated"));
        }
        Ok(())
    }

    fn own_identity(&self) -> Bytes {
        self.identity
            .clone()
            .unwrap_or_else(|| self.shared.generate_identity())
    }

    /// Attach links that connected to one of our bound addresses.
    fn accept_pending(&mut self) {
        while let Ok(link) = self.accept_rx.try_recv() {
            trace!(
                descriptor = %self.descriptor,
                peer = %hex::encode(&link.identity),
                "[MEM] Accepted peer link"
            );
            self.pipes.push(Pipe::new(
                link.tx,
                link.rx,
                link.identity,
                link.socket_type,
                link.filter,
            ));
        }
    }

    fn remove_pipe(&mut self, index: usize) {
        trace!(descriptor = %self.descriptor, "[MEM] Peer link closed");
        self.pipes.remove(index);
        if self.send_cursor > index {
            self.send_cursor -= 1;
        }
        if self.recv_cursor > index {
            self.recv_cursor -= 1;
        }
    }

    /// Pick the next pipe with room, round-robin.
    fn next_writable_pipe(&mut self) -> Option<usize> {
        let count = self.pipes.len();
        for step in 0..count {
            let index = (self.send_cursor + step) % count;
            if self.pipes[index].has_room() {
                self.send_cursor = (index + 1) % count;
                return Some(index);
            }
        }
        None
    }

    /// Decide the route of a new message from its first frame.
    fn route_for(&mut self, first: &Bytes) -> io::Result<Route> {
        match self.socket_type {
            SocketType::Router => Ok(Route::Peer(first.clone())),
            SocketType::Pub => Ok(Route::Fanout),
            _ => self
                .next_writable_pipe()
                .map(Route::Pipe)
                .ok_or_else(|| io::ErrorKind::WouldBlock.into()),
        }
    }

    fn deliver(&mut self, route: Route, message: MemMessage) {
        match route {
            Route::Pipe(index) => {
                if let Some(pipe) = self.pipes.get(index) {
                    if pipe.offer(message) == Offer::Closed {
                        self.remove_pipe(index);
                    }
                }
            }
            Route::Peer(identity) => {
                let Some(index) = self
                    .pipes
                    .iter()
                    .position(|p| p.peer_identity() == &identity)
                else {
                    trace!(peer = %hex::encode(&identity), "[MEM] Dropping message for unknown peer");
                    return;
                };
                match self.pipes[index].offer(message) {
                    Offer::Sent => {}
                    Offer::Full => {
                        trace!(peer = %hex::encode(&identity), "[MEM] Peer queue full, dropping message");
                    }
                    Offer::Closed => self.remove_pipe(index),
                }
            }
            Route::Fanout => {
                let topic = message.first().cloned().unwrap_or_default();
                let mut index = 0;
                while index < self.pipes.len() {
                    let pipe = &self.pipes[index];
                    if pipe.accepts(&topic) && pipe.offer(message.clone()) == Offer::Closed {
                        self.remove_pipe(index);
                        continue;
                    }
                    index += 1;
                }
            }
        }
    }

    /// Pull the next whole message into `inbound`, fair-queued across pipes.
    fn fetch_message(&mut self) -> bool {
        self.accept_pending();
        let mut tried = 0;
        while tried < self.pipes.len() {
            let index = self.recv_cursor % self.pipes.len();
            match self.pipes[index].poll() {
                Poll::Message(mut message) => {
                    self.recv_cursor = index + 1;
                    if self.socket_type == SocketType::Sub {
                        let topic = message.first().map(|f| &f[..]).unwrap_or_default();
                        if !self.filter.read().matches(topic) {
                            continue;
                        }
                    }
                    if self.socket_type == SocketType::Router {
                        message.insert(0, self.pipes[index].peer_identity().clone());
                    }
                    self.inbound.extend(message);
                    return true;
                }
                Poll::Empty => {
                    self.recv_cursor = index + 1;
                    tried += 1;
                }
                Poll::Closed => {
                    self.remove_pipe(index);
                    self.recv_cursor = index;
                }
            }
        }
        false
    }

    fn unbind_all(&mut self) {
        for address in self.bound.drain(..) {
            self.shared
                .endpoints
                .remove_if(&address, |_, bound| bound.owner == self.descriptor.0);
        }
    }
}

impl RawSocket for MemSocket {
    fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    fn set_option(&mut self, option: SocketOption) -> io::Result<()> {
        self.ensure_open()?;
        match option {
            SocketOption::HighWaterMark(hwm) => {
                self.hwm = usize::try_from(hwm)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative HWM"))?;
            }
            SocketOption::Identity(identity) => {
                if identity.is_empty() || identity.len() > 255 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "identity must be 1..=255 bytes",
                    ));
                }
                self.identity = Some(identity);
            }
            SocketOption::Subscribe(prefix) if self.socket_type == SocketType::Sub => {
                self.filter.write().subscribe(prefix);
            }
            SocketOption::Unsubscribe(prefix) if self.socket_type == SocketType::Sub => {
                self.filter.write().unsubscribe(&prefix);
            }
            SocketOption::Subscribe(_) | SocketOption::Unsubscribe(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "subscriptions require a SUB socket",
                ));
            }
            SocketOption::Linger(_) | SocketOption::MulticastLoop(_) | SocketOption::Rate(_) => {
                trace!(?option, "[MEM] Option has no effect in memory");
            }
        }
        Ok(())
    }

    fn bind(&mut self, address: &str) -> io::Result<()> {
        self.ensure_open()?;
        let bound = BoundEndpoint {
            owner: self.descriptor.0,
            accept: self.accept_tx.clone(),
            identity: self.own_identity(),
            socket_type: self.socket_type,
            hwm: self.hwm,
            filter: self.filter.clone(),
        };
        match self.shared.endpoints.entry(address.to_string()) {
            Entry::Occupied(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("address '{address}' is already bound"),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(bound);
            }
        }
        debug!(descriptor = %self.descriptor, address, "[MEM] Bound");
        self.bound.push(address.to_string());
        Ok(())
    }

    fn connect(&mut self, address: &str) -> io::Result<()> {
        self.ensure_open()?;
        let bound = self
            .shared
            .endpoints
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("address '{address}' not found (must bind before connect)"),
                )
            })?;

        if !self.socket_type.is_compatible(bound.socket_type) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} cannot connect to {}",
                    self.socket_type, bound.socket_type
                ),
            ));
        }

        let (to_binder, from_connector) = pipe::channel(self.hwm);
        let (to_connector, from_binder) = pipe::channel(bound.hwm);
        let link = PeerLink {
            tx: to_connector,
            rx: from_connector,
            identity: self.own_identity(),
            socket_type: self.socket_type,
            filter: self.filter.clone(),
        };
        bound.accept.send(link).map_err(|_| {
            io::Error::new(io::ErrorKind::ConnectionRefused, "bound socket is gone")
        })?;

        self.pipes.push(Pipe::new(
            to_binder,
            from_binder,
            bound.identity,
            bound.socket_type,
            bound.filter,
        ));
        debug!(descriptor = %self.descriptor, address, "[MEM] Connected");
        Ok(())
    }

    fn send_frame(&mut self, frame: &Bytes, more: bool) -> io::Result<()> {
        self.ensure_open()?;
        if !self.socket_type.can_send() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} sockets cannot send", self.socket_type),
            ));
        }
        self.accept_pending();

        if self.route.is_none() {
            self.route = Some(self.route_for(frame)?);
            if self.socket_type == SocketType::Router {
                // The identity frame is consumed by routing.
                if !more {
                    self.route = None;
                }
                return Ok(());
            }
        }
        self.staged.push(frame.clone());

        if !more {
            let message = std::mem::take(&mut self.staged);
            if let Some(route) = self.route.take() {
                self.deliver(route, message);
            }
        }
        Ok(())
    }

    fn recv_frame(&mut self) -> io::Result<Bytes> {
        self.ensure_open()?;
        if !self.socket_type.can_recv() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} sockets cannot receive", self.socket_type),
            ));
        }
        if self.inbound.is_empty() && !self.fetch_message() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.inbound
            .pop_front()
            .ok_or_else(|| io::ErrorKind::WouldBlock.into())
    }

    fn recv_more(&self) -> io::Result<bool> {
        self.ensure_open()?;
        Ok(!self.inbound.is_empty())
    }

    fn readiness(&mut self) -> io::Result<Readiness> {
        self.ensure_open()?;
        self.accept_pending();

        let readable = self.socket_type.can_recv()
            && (!self.inbound.is_empty() || self.pipes.iter().any(Pipe::has_pending));
        let writable = self.socket_type.can_send()
            && (self.route.is_some()
                || match self.socket_type {
                    SocketType::Router | SocketType::Pub => true,
                    _ => self.pipes.iter().any(Pipe::has_room),
                });
        Ok(Readiness { readable, writable })
    }

    fn descriptor(&self) -> io::Result<Descriptor> {
        self.ensure_open()?;
        Ok(self.descriptor)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }
        debug!(descriptor = %self.descriptor, "[MEM] Closing socket");
        self.unbind_all();
        self.pipes.clear();
        self.staged.clear();
        self.inbound.clear();
        self.route = None;
        self.closed = true;
        Ok(())
    }
}

impl Drop for MemSocket {
    fn drop(&mut self) {
        self.unbind_all();
    }
}
