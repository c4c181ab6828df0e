//! Asynchronous request/reply over DEALER and ROUTER sockets.
//!
//! Wire format, compatible with libzmq's REQ/REP envelope convention:
//!
//! ```text
//! requester -> replier:  [id] [""] [payload...]
//! replier   -> requester: [id] [""] [payload...]
//! ```
//!
//! A ROUTER prepends the routing identities of every hop, so the replier
//! sees `[hops...] [id] [""] [payload...]`, stores `[hops...]` under `id`
//! and puts them back in front of its reply.
//!
//! Many requests can be in flight on one requester; replies are matched by
//! id, not by order.

use bytes::Bytes;
use futures::channel::oneshot;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, trace, warn};

use trellis_core::connection::{Connection, MessageHandler};
use trellis_core::correlation::CorrelationId;
use trellis_core::endpoint::Endpoint;
use trellis_core::error::{Result, TrellisError};
use trellis_core::event_loop::TimerHandle;
use trellis_core::message::Message;
use trellis_core::options::SocketOptions;
use trellis_core::registry::Registry;
use trellis_core::socket_type::SocketType;

use crate::id_pool::{IdGenerator, IdPool, DEFAULT_BATCH_SIZE, DEFAULT_QUARANTINE};

/// Requester configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReqConfig {
    /// Timeout applied to requests sent without an explicit one
    ///
    /// - Default: None (wait forever)
    pub default_timeout: Option<Duration>,

    /// Number of ids generated per refill
    ///
    /// - Default: 5
    pub id_batch_size: usize,

    /// Time an unanswered id waits before reuse
    ///
    /// - Default: 30 seconds
    pub id_quarantine: Duration,
}

impl Default for ReqConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            id_batch_size: DEFAULT_BATCH_SIZE,
            id_quarantine: DEFAULT_QUARANTINE,
        }
    }
}

impl ReqConfig {
    /// Set the default request timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Set the id batch size.
    pub fn with_id_batch_size(mut self, size: usize) -> Self {
        self.id_batch_size = size;
        self
    }

    /// Set the id quarantine period.
    pub fn with_id_quarantine(mut self, quarantine: Duration) -> Self {
        self.id_quarantine = quarantine;
        self
    }
}

type ReplyResult = Result<Vec<Bytes>>;

struct PendingRequest {
    sender: oneshot::Sender<ReplyResult>,
    timer: Option<TimerHandle>,
}

impl PendingRequest {
    fn finish(self, result: ReplyResult) {
        if let Some(timer) = self.timer {
            timer.cancel();
        }
        // The receiver may already be gone; nothing is waiting then.
        let _ = self.sender.send(result);
    }
}

struct ReqState {
    pending: RefCell<HashMap<CorrelationId, PendingRequest>>,
    ids: RefCell<IdPool>,
    config: ReqConfig,
}

impl ReqState {
    fn take_pending(&self, id: &CorrelationId) -> Option<PendingRequest> {
        self.pending.borrow_mut().remove(id)
    }

    fn time_out(&self, id: &CorrelationId) {
        if let Some(request) = self.take_pending(id) {
            debug!(%id, "[REQ] Request timed out");
            self.ids.borrow_mut().quarantine(id.clone());
            request.finish(Err(TrellisError::RequestTimeout(id.clone())));
        }
    }

    /// Cancel `id` only while it still belongs to `receiver`; a reused id
    /// held by a newer request is left alone.
    fn cancel(&self, id: &CorrelationId, receiver: &oneshot::Receiver<ReplyResult>) {
        let owned = self
            .pending
            .borrow()
            .get(id)
            .is_some_and(|request| request.sender.is_connected_to(receiver));
        if !owned {
            return;
        }
        if let Some(request) = self.take_pending(id) {
            debug!(%id, "[REQ] Request cancelled");
            self.ids.borrow_mut().quarantine(id.clone());
            request.finish(Err(TrellisError::Cancelled(id.clone())));
        }
    }

    fn fail_all(&self) {
        let drained: Vec<PendingRequest> = self
            .pending
            .borrow_mut()
            .drain()
            .map(|(_, request)| request)
            .collect();
        if !drained.is_empty() {
            debug!(requests = drained.len(), "[REQ] Failing pending requests");
        }
        for request in drained {
            request.finish(Err(TrellisError::ConnectionClosed));
        }
    }
}

impl MessageHandler for ReqState {
    fn message_received(&self, _connection: &Connection, message: Message) {
        let mut frames = message.into_frames().into_iter();
        let (Some(id), Some(delimiter)) = (frames.next(), frames.next()) else {
            warn!("[REQ] Dropping reply without envelope");
            return;
        };
        if !delimiter.is_empty() {
            warn!("[REQ] Dropping reply with non-empty delimiter");
            return;
        }
        let id = CorrelationId::new(id);

        match self.take_pending(&id) {
            Some(request) => {
                trace!(%id, "[REQ] Reply received");
                self.ids.borrow_mut().release(id);
                request.finish(Ok(frames.collect()));
            }
            None => debug!(%id, "[REQ] Dropping stale reply"),
        }
    }

    fn connection_lost(&self, connection: &Connection, reason: &TrellisError) {
        warn!(
            descriptor = %connection.descriptor(),
            error = %reason,
            "[REQ] Connection lost"
        );
        self.fail_all();
    }

    fn connection_closed(&self, _connection: &Connection) {
        self.fail_all();
    }
}

/// Reply to one request.
///
/// Resolves with the reply payload, or with
/// [`RequestTimeout`](TrellisError::RequestTimeout),
/// [`Cancelled`](TrellisError::Cancelled) or
/// [`ConnectionClosed`](TrellisError::ConnectionClosed).
/// Dropping an unresolved future cancels the request.
pub struct ReplyFuture {
    id: CorrelationId,
    receiver: oneshot::Receiver<ReplyResult>,
    state: Weak<ReqState>,
    done: bool,
}

impl ReplyFuture {
    /// Correlation id of the request.
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Abandon the request. The future resolves to
    /// [`Cancelled`](TrellisError::Cancelled); a no-op once resolved.
    pub fn cancel(&self) {
        if let Some(state) = self.state.upgrade() {
            state.cancel(&self.id, &self.receiver);
        }
    }

    /// Take the outcome if it is already known.
    pub fn try_take(&mut self) -> Option<ReplyResult> {
        match self.receiver.try_recv() {
            Ok(Some(result)) => {
                self.done = true;
                Some(result)
            }
            Ok(None) => None,
            Err(oneshot::Canceled) => {
                self.done = true;
                Some(Err(TrellisError::ConnectionClosed))
            }
        }
    }
}

impl Future for ReplyFuture {
    type Output = ReplyResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(result) => {
                this.done = true;
                Poll::Ready(result.unwrap_or(Err(TrellisError::ConnectionClosed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ReplyFuture {
    fn drop(&mut self) {
        if !self.done {
            self.cancel();
        }
    }
}

impl fmt::Debug for ReplyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyFuture")
            .field("id", &self.id)
            .field("done", &self.done)
            .finish()
    }
}

/// Requesting side: a DEALER socket with reply correlation.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use std::time::Duration;
/// use trellis::prelude::*;
///
/// let reactor = Rc::new(Reactor::new());
/// let registry = Registry::new(MemContext::new(), reactor.clone());
///
/// let _server = RepConnection::open(
///     &registry,
///     vec![Endpoint::bind("inproc://echo")],
///     &SocketOptions::default(),
///     Rc::new(|conn: &RepConnection, id: CorrelationId, payload: Vec<bytes::Bytes>| {
///         conn.reply(id, payload).unwrap();
///     }),
/// )
/// .unwrap();
/// let client = ReqConnection::open(
///     &registry,
///     vec![Endpoint::connect("inproc://echo")],
///     &SocketOptions::default(),
///     ReqConfig::default(),
/// )
/// .unwrap();
///
/// let reply = client.send_request("ping").unwrap();
/// let payload = reactor.run_until(reply, Some(Duration::from_secs(1)));
/// assert_eq!(payload.unwrap().unwrap(), vec!["ping"]);
/// ```
#[derive(Clone)]
pub struct ReqConnection {
    connection: Connection,
    state: Rc<ReqState>,
}

impl ReqConnection {
    /// Open a DEALER connection on `endpoints`.
    ///
    /// # Errors
    ///
    /// Any setup error of [`Connection::open`].
    pub fn open(
        registry: &Registry,
        endpoints: Vec<Endpoint>,
        options: &SocketOptions,
        config: ReqConfig,
    ) -> Result<Self> {
        let state = Rc::new(ReqState {
            pending: RefCell::new(HashMap::new()),
            ids: RefCell::new(IdPool::new(config.id_batch_size, config.id_quarantine)),
            config,
        });
        let connection = Connection::open(
            registry,
            SocketType::Dealer,
            endpoints,
            options,
            state.clone(),
        )?;
        Ok(Self { connection, state })
    }

    /// Send a request, applying the default timeout if one is configured.
    ///
    /// # Errors
    ///
    /// Any error of [`Connection::send`]; nothing stays pending then.
    pub fn send_request(&self, payload: impl Into<Message>) -> Result<ReplyFuture> {
        self.request(payload.into(), self.state.config.default_timeout)
    }

    /// Send a request that fails with
    /// [`RequestTimeout`](TrellisError::RequestTimeout) after `timeout`.
    ///
    /// # Errors
    ///
    /// Any error of [`Connection::send`]; nothing stays pending then.
    pub fn send_request_with_timeout(
        &self,
        payload: impl Into<Message>,
        timeout: Duration,
    ) -> Result<ReplyFuture> {
        self.request(payload.into(), Some(timeout))
    }

    fn request(&self, payload: Message, timeout: Option<Duration>) -> Result<ReplyFuture> {
        let id = self.state.ids.borrow_mut().acquire();
        let (sender, receiver) = oneshot::channel();
        self.state.pending.borrow_mut().insert(
            id.clone(),
            PendingRequest {
                sender,
                timer: None,
            },
        );

        let mut frames = Vec::with_capacity(payload.len() + 2);
        frames.push(id.as_bytes().clone());
        frames.push(Bytes::new());
        frames.extend(payload.into_frames());

        if let Err(err) = self.connection.send(Message::from_frames(frames)) {
            self.state.take_pending(&id);
            self.state.ids.borrow_mut().release(id);
            return Err(err);
        }
        trace!(%id, "[REQ] Request sent");

        if let Some(timeout) = timeout {
            let state = Rc::downgrade(&self.state);
            let timer_id = id.clone();
            let timer = self.connection.event_loop().call_later(
                timeout,
                Box::new(move || {
                    if let Some(state) = state.upgrade() {
                        state.time_out(&timer_id);
                    }
                }),
            );
            match self.state.pending.borrow_mut().get_mut(&id) {
                Some(request) => request.timer = Some(timer),
                None => timer.cancel(),
            }
        }

        Ok(ReplyFuture {
            id,
            receiver,
            state: Rc::downgrade(&self.state),
            done: false,
        })
    }

    /// Use `generator` for ids generated from now on.
    pub fn set_id_generator(&self, generator: IdGenerator) {
        self.state.ids.borrow_mut().set_generator(generator);
    }

    /// Requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.state.pending.borrow().len()
    }

    /// Ids ready for reuse.
    pub fn available_ids(&self) -> usize {
        self.state.ids.borrow().available()
    }

    /// Ids waiting out their quarantine.
    pub fn quarantined_ids(&self) -> usize {
        self.state.ids.borrow().quarantined()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Shut the connection down; pending requests fail with
    /// [`ConnectionClosed`](TrellisError::ConnectionClosed).
    ///
    /// # Errors
    ///
    /// [`TrellisError::InvalidState`] if already closed.
    pub fn shutdown(&self) -> Result<()> {
        self.connection.shutdown()
    }
}

/// Handles requests arriving at a [`RepConnection`].
pub trait RepHandler {
    /// A request with correlation `id` arrived. Answer it with
    /// [`RepConnection::reply`], now or later.
    fn got_message(&self, connection: &RepConnection, id: CorrelationId, payload: Vec<Bytes>);
}

impl<F> RepHandler for F
where
    F: Fn(&RepConnection, CorrelationId, Vec<Bytes>),
{
    fn got_message(&self, connection: &RepConnection, id: CorrelationId, payload: Vec<Bytes>) {
        self(connection, id, payload)
    }
}

struct RepState {
    me: Weak<RepState>,
    routes: RefCell<HashMap<CorrelationId, Vec<Bytes>>>,
    handler: Rc<dyn RepHandler>,
}

impl MessageHandler for RepState {
    fn message_received(&self, connection: &Connection, message: Message) {
        let Some(delimiter) = message.delimiter_index().filter(|&i| i > 0) else {
            warn!(frames = message.len(), "[REP] Dropping request without envelope");
            return;
        };
        let mut frames = message.into_frames();
        let payload = frames.split_off(delimiter + 1);
        frames.pop();
        let Some(id) = frames.pop().map(CorrelationId::new) else {
            return;
        };

        if self
            .routes
            .borrow_mut()
            .insert(id.clone(), frames)
            .is_some()
        {
            debug!(%id, "[REP] Replacing stale routing entry");
        }
        trace!(%id, "[REP] Request received");

        let Some(state) = self.me.upgrade() else {
            return;
        };
        let rep = RepConnection {
            connection: connection.clone(),
            state,
        };
        self.handler.got_message(&rep, id, payload);
    }

    fn connection_closed(&self, _connection: &Connection) {
        self.routes.borrow_mut().clear();
    }
}

/// Replying side: a ROUTER socket that remembers where each request came from.
#[derive(Clone)]
pub struct RepConnection {
    connection: Connection,
    state: Rc<RepState>,
}

impl RepConnection {
    /// Open a ROUTER connection on `endpoints`.
    ///
    /// # Errors
    ///
    /// Any setup error of [`Connection::open`].
    pub fn open(
        registry: &Registry,
        endpoints: Vec<Endpoint>,
        options: &SocketOptions,
        handler: Rc<dyn RepHandler>,
    ) -> Result<Self> {
        let state = Rc::new_cyclic(|me| RepState {
            me: me.clone(),
            routes: RefCell::new(HashMap::new()),
            handler,
        });
        let connection = Connection::open(
            registry,
            SocketType::Router,
            endpoints,
            options,
            state.clone(),
        )?;
        Ok(Self { connection, state })
    }

    /// Answer request `id`. Each id can be answered once.
    ///
    /// # Errors
    ///
    /// - [`TrellisError::UnknownCorrelationId`] if `id` has no routing entry
    /// - any error of [`Connection::send`]
    pub fn reply(&self, id: CorrelationId, payload: impl Into<Message>) -> Result<()> {
        let Some(mut frames) = self.state.routes.borrow_mut().remove(&id) else {
            return Err(TrellisError::UnknownCorrelationId(id));
        };
        frames.push(id.into_bytes());
        frames.push(Bytes::new());
        frames.extend(payload.into().into_frames());
        self.connection.send(Message::from_frames(frames))
    }

    /// Requests received but not yet answered.
    pub fn pending_replies(&self) -> usize {
        self.state.routes.borrow().len()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Shut the connection down.
    ///
    /// # Errors
    ///
    /// [`TrellisError::InvalidState`] if already closed.
    pub fn shutdown(&self) -> Result<()> {
        self.connection.shutdown()
    }
}
