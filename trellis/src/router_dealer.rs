//! Raw ROUTER and DEALER connections.
//!
//! No envelope handling beyond what the socket type itself does: a ROUTER
//! exposes the sender identity of each message and takes a recipient
//! identity for each send; a DEALER passes frames through untouched.

use bytes::Bytes;
use std::rc::Rc;
use tracing::warn;

use trellis_core::connection::{Connection, MessageHandler};
use trellis_core::endpoint::Endpoint;
use trellis_core::error::Result;
use trellis_core::message::Message;
use trellis_core::options::SocketOptions;
use trellis_core::registry::Registry;
use trellis_core::socket_type::SocketType;

/// Handles messages arriving at a [`RouterConnection`].
pub trait RouterHandler {
    /// `parts` arrived from the peer identified by `sender`.
    fn got_message(&self, connection: &RouterConnection, sender: Bytes, parts: Vec<Bytes>);
}

impl<F> RouterHandler for F
where
    F: Fn(&RouterConnection, Bytes, Vec<Bytes>),
{
    fn got_message(&self, connection: &RouterConnection, sender: Bytes, parts: Vec<Bytes>) {
        self(connection, sender, parts)
    }
}

/// Handles messages arriving at a [`DealerConnection`].
pub trait DealerHandler {
    /// A message arrived.
    fn got_message(&self, connection: &DealerConnection, parts: Vec<Bytes>);
}

impl<F> DealerHandler for F
where
    F: Fn(&DealerConnection, Vec<Bytes>),
{
    fn got_message(&self, connection: &DealerConnection, parts: Vec<Bytes>) {
        self(connection, parts)
    }
}

struct RouterState {
    handler: Rc<dyn RouterHandler>,
}

impl MessageHandler for RouterState {
    fn message_received(&self, connection: &Connection, message: Message) {
        let mut frames = message.into_frames();
        if frames.is_empty() {
            warn!("[ROUTER] Dropping message without sender");
            return;
        }
        let parts = frames.split_off(1);
        let sender = frames.swap_remove(0);
        let router = RouterConnection {
            connection: connection.clone(),
        };
        self.handler.got_message(&router, sender, parts);
    }
}

/// ROUTER connection addressing peers by identity.
///
/// Messages to unknown identities are dropped by the socket.
#[derive(Clone)]
pub struct RouterConnection {
    connection: Connection,
}

impl RouterConnection {
    /// Open a ROUTER connection on `endpoints`.
    ///
    /// # Errors
    ///
    /// Any setup error of [`Connection::open`].
    pub fn open(
        registry: &Registry,
        endpoints: Vec<Endpoint>,
        options: &SocketOptions,
        handler: Rc<dyn RouterHandler>,
    ) -> Result<Self> {
        let connection = Connection::open(
            registry,
            SocketType::Router,
            endpoints,
            options,
            Rc::new(RouterState { handler }),
        )?;
        Ok(Self { connection })
    }

    /// Send one frame to `recipient`.
    ///
    /// # Errors
    ///
    /// Any error of [`Connection::send`].
    pub fn send_msg(&self, recipient: impl Into<Bytes>, frame: impl Into<Bytes>) -> Result<()> {
        self.send_multipart(recipient, [frame.into()])
    }

    /// Send a multipart message to `recipient`.
    ///
    /// # Errors
    ///
    /// Any error of [`Connection::send`].
    pub fn send_multipart(
        &self,
        recipient: impl Into<Bytes>,
        parts: impl IntoIterator<Item = Bytes>,
    ) -> Result<()> {
        let mut frames = vec![recipient.into()];
        frames.extend(parts);
        self.connection.send(Message::from_frames(frames))
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Shut the connection down.
    ///
    /// # Errors
    ///
    /// [`TrellisError::InvalidState`](trellis_core::error::TrellisError::InvalidState)
    /// if already closed.
    pub fn shutdown(&self) -> Result<()> {
        self.connection.shutdown()
    }
}

struct DealerState {
    handler: Rc<dyn DealerHandler>,
}

impl MessageHandler for DealerState {
    fn message_received(&self, connection: &Connection, message: Message) {
        let dealer = DealerConnection {
            connection: connection.clone(),
        };
        self.handler.got_message(&dealer, message.into_frames());
    }
}

/// DEALER connection: load-balanced sends, fair-queued receives.
#[derive(Clone)]
pub struct DealerConnection {
    connection: Connection,
}

impl DealerConnection {
    /// Open a DEALER connection on `endpoints`.
    ///
    /// # Errors
    ///
    /// Any setup error of [`Connection::open`].
    pub fn open(
        registry: &Registry,
        endpoints: Vec<Endpoint>,
        options: &SocketOptions,
        handler: Rc<dyn DealerHandler>,
    ) -> Result<Self> {
        let connection = Connection::open(
            registry,
            SocketType::Dealer,
            endpoints,
            options,
            Rc::new(DealerState { handler }),
        )?;
        Ok(Self { connection })
    }

    /// Send one frame.
    ///
    /// # Errors
    ///
    /// Any error of [`Connection::send`].
    pub fn send_msg(&self, frame: impl Into<Bytes>) -> Result<()> {
        self.connection.send(Message::single(frame))
    }

    /// Send a multipart message.
    ///
    /// # Errors
    ///
    /// [`TrellisError::EmptyMessage`](trellis_core::error::TrellisError::EmptyMessage)
    /// for no parts, or any error of [`Connection::send`].
    pub fn send_multipart(&self, parts: impl IntoIterator<Item = Bytes>) -> Result<()> {
        self.connection
            .send(Message::from_frames(parts.into_iter().collect()))
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Shut the connection down.
    ///
    /// # Errors
    ///
    /// [`TrellisError::InvalidState`](trellis_core::error::TrellisError::InvalidState)
    /// if already closed.
    pub fn shutdown(&self) -> Result<()> {
        self.connection.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;
    use trellis_core::error::TrellisError;
    use trellis_core::mem::MemContext;
    use trellis_core::reactor::Reactor;

    #[test]
    fn test_router_strips_and_readds_identity() {
        let reactor = Rc::new(Reactor::new());
        let registry = Registry::new(MemContext::new(), reactor.clone());

        let _router = RouterConnection::open(
            &registry,
            vec![Endpoint::bind("inproc://router")],
            &SocketOptions::default(),
            Rc::new(|conn: &RouterConnection, sender: Bytes, parts: Vec<Bytes>| {
                assert_eq!(sender, "dealer-1");
                let mut reply = vec![Bytes::from_static(b"re:")];
                reply.extend(parts);
                conn.send_multipart(sender, reply).unwrap();
            }),
        )
        .unwrap();

        let replies = Rc::new(RefCell::new(Vec::new()));
        let sink = replies.clone();
        let dealer = DealerConnection::open(
            &registry,
            vec![Endpoint::connect("inproc://router")],
            &SocketOptions::default().with_identity("dealer-1"),
            Rc::new(move |_: &DealerConnection, parts: Vec<Bytes>| {
                sink.borrow_mut().push(parts);
            }),
        )
        .unwrap();

        dealer.send_msg("hello").unwrap();
        reactor.run_for(Duration::from_millis(20));

        assert_eq!(*replies.borrow(), vec![vec![Bytes::from("re:"), Bytes::from("hello")]]);
    }

    #[test]
    fn test_router_dispatches_sender_without_parts() {
        let reactor = Rc::new(Reactor::new());
        let registry = Registry::new(MemContext::new(), reactor);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let handler: Rc<dyn RouterHandler> =
            Rc::new(move |_: &RouterConnection, sender: Bytes, parts: Vec<Bytes>| {
                sink.borrow_mut().push((sender, parts));
            });
        let router = RouterConnection::open(
            &registry,
            vec![Endpoint::bind("inproc://sender-only")],
            &SocketOptions::default(),
            handler.clone(),
        )
        .unwrap();

        let state = RouterState { handler };
        state.message_received(router.connection(), Message::single("peer"));
        state.message_received(router.connection(), Message::new());

        assert_eq!(*calls.borrow(), vec![(Bytes::from("peer"), Vec::new())]);
    }

    #[test]
    fn test_dealer_rejects_empty_multipart() {
        let reactor = Rc::new(Reactor::new());
        let registry = Registry::new(MemContext::new(), reactor);
        let _router = RouterConnection::open(
            &registry,
            vec![Endpoint::bind("inproc://empty")],
            &SocketOptions::default(),
            Rc::new(|_: &RouterConnection, _: Bytes, _: Vec<Bytes>| {}),
        )
        .unwrap();
        let dealer = DealerConnection::open(
            &registry,
            vec![Endpoint::connect("inproc://empty")],
            &SocketOptions::default(),
            Rc::new(|_: &DealerConnection, _: Vec<Bytes>| {}),
        )
        .unwrap();

        let err = dealer.send_multipart(Vec::new()).unwrap_err();
        assert!(matches!(err, TrellisError::EmptyMessage));
    }
}
