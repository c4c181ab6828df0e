//! PUSH/PULL pipelines.

use std::rc::Rc;
use tracing::trace;

use trellis_core::connection::{Connection, MessageHandler};
use trellis_core::endpoint::Endpoint;
use trellis_core::error::Result;
use trellis_core::message::Message;
use trellis_core::options::SocketOptions;
use trellis_core::registry::Registry;
use trellis_core::socket_type::SocketType;

struct PushState;

impl MessageHandler for PushState {
    fn message_received(&self, _connection: &Connection, message: Message) {
        trace!(frames = message.len(), "[PUSH] Ignoring inbound message");
    }
}

/// Sending end of a pipeline; messages are load-balanced across pullers.
#[derive(Clone)]
pub struct PushConnection {
    connection: Connection,
}

impl PushConnection {
    /// Open a PUSH connection on `endpoints`.
    ///
    /// # Errors
    ///
    /// Any setup error of [`Connection::open`].
    pub fn open(
        registry: &Registry,
        endpoints: Vec<Endpoint>,
        options: &SocketOptions,
    ) -> Result<Self> {
        let connection = Connection::open(
            registry,
            SocketType::Push,
            endpoints,
            options,
            Rc::new(PushState),
        )?;
        Ok(Self { connection })
    }

    /// Push a message downstream.
    ///
    /// # Errors
    ///
    /// Any error of [`Connection::send`].
    pub fn push(&self, message: impl Into<Message>) -> Result<()> {
        self.connection.send(message)
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

/// Handles messages arriving at a [`PullConnection`].
pub trait PullHandler {
    /// A message was pulled.
    fn on_pull(&self, connection: &PullConnection, message: Message);
}

impl<F> PullHandler for F
where
    F: Fn(&PullConnection, Message),
{
    fn on_pull(&self, connection: &PullConnection, message: Message) {
        self(connection, message)
    }
}

struct PullState {
    handler: Rc<dyn PullHandler>,
}

impl MessageHandler for PullState {
    fn message_received(&self, connection: &Connection, message: Message) {
        let pull = PullConnection {
            connection: connection.clone(),
        };
        self.handler.on_pull(&pull, message);
    }
}

/// Receiving end of a pipeline; messages are fair-queued across pushers.
#[derive(Clone)]
pub struct PullConnection {
    connection: Connection,
}

impl PullConnection {
    /// Open a PULL connection on `endpoints`.
    ///
    /// # Errors
    ///
    /// Any setup error of [`Connection::open`].
    pub fn open(
        registry: &Registry,
        endpoints: Vec<Endpoint>,
        options: &SocketOptions,
        handler: Rc<dyn PullHandler>,
    ) -> Result<Self> {
        let connection = Connection::open(
            registry,
            SocketType::Pull,
            endpoints,
            options,
            Rc::new(PullState { handler }),
        )?;
        Ok(Self { connection })
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
    use trellis_core::mem::MemContext;
    use trellis_core::reactor::Reactor;

    #[test]
    fn test_push_reaches_every_puller_in_turn() {
        let reactor = Rc::new(Reactor::new());
        let registry = Registry::new(MemContext::new(), reactor.clone());

        let pulled = Rc::new(RefCell::new(Vec::new()));
        let mut pullers = Vec::new();
        for name in ["inproc://worker-a", "inproc://worker-b"] {
            let sink = pulled.clone();
            pullers.push(
                PullConnection::open(
                    &registry,
                    vec![Endpoint::bind(name)],
                    &SocketOptions::default(),
                    Rc::new(move |_: &PullConnection, message: Message| {
                        sink.borrow_mut().push((name, message));
                    }),
                )
                .unwrap(),
            );
        }
        let push = PushConnection::open(
            &registry,
            vec![
                Endpoint::connect("inproc://worker-a"),
                Endpoint::connect("inproc://worker-b"),
            ],
            &SocketOptions::default(),
        )
        .unwrap();

        push.push("job-1").unwrap();
        push.push("job-2").unwrap();
        reactor.run_for(Duration::from_millis(20));

        let mut pulled = pulled.borrow().clone();
        pulled.sort_by_key(|(name, _)| *name);
        assert_eq!(
            pulled,
            vec![
                ("inproc://worker-a", Message::from("job-1")),
                ("inproc://worker-b", Message::from("job-2")),
            ]
        );
    }
}
