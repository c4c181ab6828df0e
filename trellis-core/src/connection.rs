//! Per-socket connection: readiness in, whole messages out.
//!
//! A [`Connection`] owns one [`RawSocket`] and bridges it to the host event
//! loop. Inbound frames are assembled into [`Message`]s and handed to a
//! [`MessageHandler`]; outbound messages are split into frames, queued, and
//! drained whenever the socket accepts them.
//!
//! # State machine
//!
//! ```text
//! Unconfigured -> Active -> ShuttingDown -> Closed
//! ```
//!
//! Only `Active` connections send or receive. A fatal socket error moves the
//! connection to `ShuttingDown` and notifies the handler once; `shutdown()`
//! finishes the job.
//!
//! # Backpressure
//!
//! The outbound queue is unbounded. When the socket library reports that a
//! peer's high water mark is reached, frames stay queued until the socket
//! becomes writable again; [`Connection::queued_frames`] exposes the depth so
//! producers can throttle themselves.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace, warn};

use crate::endpoint::{Endpoint, EndpointKind};
use crate::error::{is_would_block, Result, TrellisError};
use crate::event_loop::{EventLoop, ReadinessHandler};
use crate::message::{Message, OutboundFrame};
use crate::multipart::MultipartBuffer;
use crate::options::SocketOptions;
use crate::registry::{Registry, WeakRegistry};
use crate::socket::{Descriptor, RawSocket, SocketOption};
use crate::socket_type::SocketType;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Socket created, endpoints not yet attached
    Unconfigured,
    /// Bound/connected and registered with the event loop
    Active,
    /// Stopped receiving; waiting for `shutdown()`
    ShuttingDown,
    /// Socket closed; terminal
    Closed,
}

impl ConnectionState {
    /// Get the state as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Active => "active",
            Self::ShuttingDown => "shutting down",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives the events of one connection.
///
/// Callbacks run on the event-loop thread with no internal borrow held, so
/// they may call [`Connection::send`] or [`Connection::shutdown`].
pub trait MessageHandler {
    /// A complete message arrived.
    fn message_received(&self, connection: &Connection, message: Message);

    /// A fatal socket error stopped the connection. Called at most once.
    fn connection_lost(&self, connection: &Connection, reason: &TrellisError) {
        error!(
            socket_type = %connection.socket_type(),
            descriptor = %connection.descriptor(),
            error = %reason,
            "[CONNECTION] Connection lost"
        );
    }

    /// The connection was shut down and is about to drop this handler.
    fn connection_closed(&self, _connection: &Connection) {}
}

impl<F> MessageHandler for F
where
    F: Fn(&Connection, Message),
{
    fn message_received(&self, connection: &Connection, message: Message) {
        self(connection, message)
    }
}

struct ConnectionInner {
    me: Weak<ConnectionInner>,
    key: u64,
    socket_type: SocketType,
    endpoints: Vec<Endpoint>,
    descriptor: Descriptor,
    registry: WeakRegistry,
    event_loop: Rc<dyn EventLoop>,
    state: Cell<ConnectionState>,
    listening: Cell<bool>,
    connected: Cell<bool>,
    socket: RefCell<Box<dyn RawSocket>>,
    outbound: RefCell<VecDeque<OutboundFrame>>,
    assembly: RefCell<MultipartBuffer>,
    handler: RefCell<Option<Rc<dyn MessageHandler>>>,
}

impl ReadinessHandler for ConnectionInner {
    fn on_ready(&self) -> bool {
        match self.me.upgrade() {
            Some(inner) => Connection { inner }.on_readable(),
            None => false,
        }
    }
}

/// Handle to a live socket connection.
///
/// Cloning is cheap and shares the same connection.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<ConnectionInner>,
}

impl Connection {
    /// Create a socket, apply `options`, attach every endpoint in order and
    /// start watching the socket.
    ///
    /// # Errors
    ///
    /// - [`TrellisError::Endpoint`] for an unparseable address
    /// - [`TrellisError::Listen`] / [`TrellisError::Connect`] when attaching
    ///   an endpoint fails; the socket is closed again
    /// - [`TrellisError::Socket`] when the socket cannot be created or
    ///   configured
    pub fn open(
        registry: &Registry,
        socket_type: SocketType,
        endpoints: Vec<Endpoint>,
        options: &SocketOptions,
        handler: Rc<dyn MessageHandler>,
    ) -> Result<Self> {
        for endpoint in &endpoints {
            endpoint.transport()?;
        }

        let mut socket = registry.context().create_socket(socket_type)?;
        let mut listening = false;
        let mut connected = false;
        let configured = Self::configure(
            socket.as_mut(),
            &endpoints,
            options,
            registry,
            &mut listening,
            &mut connected,
        );
        let descriptor = match configured.and_then(|()| Ok(socket.descriptor()?)) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                if let Err(close_err) = socket.close() {
                    debug!(error = %close_err, "[CONNECTION] Close after failed setup");
                }
                return Err(err);
            }
        };

        let key = registry.next_key();
        let inner = Rc::new_cyclic(|me| ConnectionInner {
            me: me.clone(),
            key,
            socket_type,
            endpoints,
            descriptor,
            registry: registry.downgrade(),
            event_loop: registry.event_loop(),
            state: Cell::new(ConnectionState::Unconfigured),
            listening: Cell::new(listening),
            connected: Cell::new(connected),
            socket: RefCell::new(socket),
            outbound: RefCell::new(VecDeque::new()),
            assembly: RefCell::new(MultipartBuffer::new(options.max_msg_size)),
            handler: RefCell::new(Some(handler)),
        });
        let connection = Self { inner };

        connection
            .inner
            .event_loop
            .add_reader(descriptor, connection.inner.clone());
        registry.register(key, connection.clone());
        connection.inner.state.set(ConnectionState::Active);

        debug!(
            socket_type = %socket_type,
            %descriptor,
            endpoints = connection.inner.endpoints.len(),
            "[CONNECTION] Active"
        );
        Ok(connection)
    }

    fn configure(
        socket: &mut dyn RawSocket,
        endpoints: &[Endpoint],
        options: &SocketOptions,
        registry: &Registry,
        listening: &mut bool,
        connected: &mut bool,
    ) -> Result<()> {
        for option in options.socket_options(registry.config().linger) {
            socket.set_option(option)?;
        }
        for endpoint in endpoints {
            match endpoint.kind() {
                EndpointKind::Bind => {
                    socket
                        .bind(endpoint.address())
                        .map_err(|e| TrellisError::listen(endpoint.address(), e))?;
                    *listening = true;
                }
                EndpointKind::Connect => {
                    socket
                        .connect(endpoint.address())
                        .map_err(|e| TrellisError::connect(endpoint.address(), e))?;
                    *connected = true;
                }
            }
            trace!(%endpoint, "[CONNECTION] Endpoint attached");
        }
        Ok(())
    }

    /// Queue a message and try to send it right away.
    ///
    /// Frames that the socket does not accept yet stay queued and are sent
    /// when it becomes writable.
    ///
    /// # Errors
    ///
    /// - [`TrellisError::InvalidState`] unless the connection is `Active`
    /// - [`TrellisError::EmptyMessage`] for a message without frames
    /// - [`TrellisError::Socket`] if the socket failed; the connection is
    ///   then lost
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.ensure_active()?;
        let frames = message.into().into_outbound()?;
        self.inner.outbound.borrow_mut().extend(frames);

        // Reading the readiness bitmask lets the library process pending
        // events, which re-arms edge-triggered descriptors.
        let polled = self.inner.socket.borrow_mut().readiness();
        if let Err(err) = polled {
            return Err(self.fail(err.into()));
        }

        match self.flush() {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Readiness callback: deliver every complete inbound message, then
    /// drain the outbound queue if the socket is writable.
    ///
    /// Returns true if any frame moved.
    pub fn on_readable(&self) -> bool {
        if self.state() != ConnectionState::Active {
            return false;
        }
        let polled = self.inner.socket.borrow_mut().readiness();
        let readiness = match polled {
            Ok(readiness) => readiness,
            Err(err) => {
                self.fail(err.into());
                return false;
            }
        };

        let mut progress = false;
        if readiness.readable {
            progress |= self.drain_inbound();
        }
        if readiness.writable
            && self.state() == ConnectionState::Active
            && !self.inner.outbound.borrow().is_empty()
        {
            progress |= self.on_writable();
        }
        progress
    }

    /// Drain the outbound queue until it is empty or the socket would block.
    ///
    /// Returns true if any frame was sent.
    pub fn on_writable(&self) -> bool {
        match self.flush() {
            Ok(sent) => sent > 0,
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    /// Stop watching the socket, leave the registry and close the socket.
    ///
    /// # Errors
    ///
    /// [`TrellisError::InvalidState`] if the connection is already closed.
    pub fn shutdown(&self) -> Result<()> {
        let state = self.state();
        match state {
            ConnectionState::Closed => return Err(TrellisError::InvalidState(state)),
            ConnectionState::Active | ConnectionState::Unconfigured => {
                self.inner.event_loop.remove_reader(self.inner.descriptor);
            }
            ConnectionState::ShuttingDown => {}
        }
        self.inner.state.set(ConnectionState::ShuttingDown);

        if let Some(registry) = self.inner.registry.upgrade() {
            registry.deregister(self.inner.key);
        }

        let dropped = {
            let mut outbound = self.inner.outbound.borrow_mut();
            let n = outbound.len();
            outbound.clear();
            n
        };
        if dropped > 0 {
            debug!(frames = dropped, "[CONNECTION] Dropping unsent frames");
        }

        let closed = self.inner.socket.borrow_mut().close();
        if let Err(err) = closed {
            warn!(error = %err, "[CONNECTION] Socket close failed");
        }
        self.inner.listening.set(false);
        self.inner.connected.set(false);
        self.inner.state.set(ConnectionState::Closed);

        let handler = self.inner.handler.borrow_mut().take();
        if let Some(handler) = handler {
            handler.connection_closed(self);
        }

        debug!(
            socket_type = %self.inner.socket_type,
            descriptor = %self.inner.descriptor,
            "[CONNECTION] Closed"
        );
        Ok(())
    }

    /// Apply a socket option after setup (e.g. SUB filters).
    ///
    /// # Errors
    ///
    /// [`TrellisError::InvalidState`] unless `Active`, or
    /// [`TrellisError::Socket`] if the library rejects the option.
    pub fn set_socket_option(&self, option: SocketOption) -> Result<()> {
        self.ensure_active()?;
        self.inner.socket.borrow_mut().set_option(option)?;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Socket pattern of this connection.
    pub fn socket_type(&self) -> SocketType {
        self.inner.socket_type
    }

    /// Endpoints in attachment order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.inner.endpoints
    }

    /// True if at least one endpoint was bound and the socket is open.
    pub fn is_listening(&self) -> bool {
        self.inner.listening.get()
    }

    /// True if at least one endpoint was connected and the socket is open.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.get()
    }

    /// Number of frames waiting to be accepted by the socket.
    pub fn queued_frames(&self) -> usize {
        self.inner.outbound.borrow().len()
    }

    /// Descriptor registered with the event loop.
    pub fn descriptor(&self) -> Descriptor {
        self.inner.descriptor
    }

    /// The event loop this connection is registered with.
    pub fn event_loop(&self) -> Rc<dyn EventLoop> {
        self.inner.event_loop.clone()
    }

    /// Whether two handles refer to the same connection.
    pub fn ptr_eq(&self, other: &Connection) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Active => Ok(()),
            state => Err(TrellisError::InvalidState(state)),
        }
    }

    /// Send queued frames in order. Returns how many were accepted.
    fn flush(&self) -> Result<usize> {
        let mut socket = self.inner.socket.borrow_mut();
        let mut outbound = self.inner.outbound.borrow_mut();
        let mut sent = 0;
        while let Some(front) = outbound.front() {
            match socket.send_frame(&front.data, front.more) {
                Ok(()) => {
                    outbound.pop_front();
                    sent += 1;
                }
                Err(err) if is_would_block(&err) => {
                    trace!(queued = outbound.len(), "[CONNECTION] Send would block");
                    break;
                }
                Err(err) => {
                    outbound.pop_front();
                    return Err(err.into());
                }
            }
        }
        Ok(sent)
    }

    fn drain_inbound(&self) -> bool {
        let mut delivered = false;
        while self.state() == ConnectionState::Active {
            match self.read_message() {
                Ok(Some(message)) => {
                    delivered = true;
                    self.dispatch(message);
                }
                Ok(None) => break,
                Err(err) => {
                    self.fail(err);
                    break;
                }
            }
        }
        delivered
    }

    /// Receive frames until one message completes or the socket would block.
    /// Frames of an incomplete message stay in the assembly buffer.
    fn read_message(&self) -> Result<Option<Message>> {
        let mut socket = self.inner.socket.borrow_mut();
        let mut assembly = self.inner.assembly.borrow_mut();
        loop {
            let frame = match socket.recv_frame() {
                Ok(frame) => frame,
                Err(err) if is_would_block(&err) => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            let more = socket.recv_more()?;
            if let Some(message) = assembly.push_frame(frame, more)? {
                return Ok(Some(message));
            }
        }
    }

    fn handler(&self) -> Option<Rc<dyn MessageHandler>> {
        self.inner.handler.borrow().clone()
    }

    fn dispatch(&self, message: Message) {
        trace!(frames = message.len(), "[CONNECTION] Message received");
        if let Some(handler) = self.handler() {
            handler.message_received(self, message);
        }
    }

    /// Fatal error path: stop reading, move to `ShuttingDown`, tell the
    /// handler once. Hands the error back for the caller to return.
    fn fail(&self, err: TrellisError) -> TrellisError {
        if self.state() != ConnectionState::Active {
            return err;
        }
        warn!(
            socket_type = %self.inner.socket_type,
            descriptor = %self.inner.descriptor,
            error = %err,
            "[CONNECTION] Fatal socket error"
        );
        self.inner.event_loop.remove_reader(self.inner.descriptor);
        self.inner.state.set(ConnectionState::ShuttingDown);
        if let Some(handler) = self.handler() {
            handler.connection_lost(self, &err);
        }
        err
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("socket_type", &self.inner.socket_type)
            .field("role", &self.inner.socket_type.description())
            .field("descriptor", &self.inner.descriptor)
            .field("state", &self.state())
            .field("endpoints", &self.inner.endpoints)
            .finish()
    }
}
