//! Tagged publish/subscribe.
//!
//! A publication travels as one frame, `tag ++ 0x00 ++ message`, so
//! subscribers filter on the tag with ordinary prefix subscriptions.
//! Two-frame `[tag, message]` publications from other publishers are
//! understood too.

use bytes::{BufMut, Bytes, BytesMut};
use std::rc::Rc;
use tracing::trace;

use trellis_core::connection::{Connection, MessageHandler};
use trellis_core::endpoint::Endpoint;
use trellis_core::error::Result;
use trellis_core::message::Message;
use trellis_core::options::SocketOptions;
use trellis_core::registry::Registry;
use trellis_core::socket::SocketOption;
use trellis_core::socket_type::SocketType;

/// Separator between tag and message.
pub const TOPIC_SEPARATOR: u8 = 0;

/// Publishing side.
#[derive(Clone)]
pub struct PubConnection {
    connection: Connection,
}

struct PubState;

impl MessageHandler for PubState {
    fn message_received(&self, _connection: &Connection, message: Message) {
        trace!(frames = message.len(), "[PUB] Ignoring inbound message");
    }
}

impl PubConnection {
    /// Open a PUB connection on `endpoints`.
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
            SocketType::Pub,
            endpoints,
            options,
            Rc::new(PubState),
        )?;
        Ok(Self { connection })
    }

    /// Publish `message` under `tag`.
    ///
    /// # Errors
    ///
    /// Any error of [`Connection::send`].
    pub fn publish(&self, message: impl AsRef<[u8]>, tag: impl AsRef<[u8]>) -> Result<()> {
        let (message, tag) = (message.as_ref(), tag.as_ref());
        let mut frame = BytesMut::with_capacity(tag.len() + 1 + message.len());
        frame.put_slice(tag);
        frame.put_u8(TOPIC_SEPARATOR);
        frame.put_slice(message);
        self.connection.send(frame.freeze())
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

/// Handles publications arriving at a [`SubConnection`].
pub trait SubHandler {
    /// `message` was published under `tag`.
    fn got_message(&self, connection: &SubConnection, message: Bytes, tag: Bytes);
}

impl<F> SubHandler for F
where
    F: Fn(&SubConnection, Bytes, Bytes),
{
    fn got_message(&self, connection: &SubConnection, message: Bytes, tag: Bytes) {
        self(connection, message, tag)
    }
}

/// Split a publication into `(message, tag)`.
///
/// A single frame is split at the first separator; without one the whole
/// frame is the message and the tag is empty. Frames past the second are
/// ignored.
pub fn split_publication(frames: Vec<Bytes>) -> Option<(Bytes, Bytes)> {
    let mut frames = frames.into_iter();
    let first = frames.next()?;
    if let Some(message) = frames.next() {
        return Some((message, first));
    }
    match first.iter().position(|&b| b == TOPIC_SEPARATOR) {
        Some(at) => Some((first.slice(at + 1..), first.slice(..at))),
        None => Some((first, Bytes::new())),
    }
}

struct SubState {
    handler: Rc<dyn SubHandler>,
}

impl MessageHandler for SubState {
    fn message_received(&self, connection: &Connection, message: Message) {
        let Some((payload, tag)) = split_publication(message.into_frames()) else {
            return;
        };
        let sub = SubConnection {
            connection: connection.clone(),
        };
        self.handler.got_message(&sub, payload, tag);
    }
}

/// Subscribing side.
#[derive(Clone)]
pub struct SubConnection {
    connection: Connection,
}

impl SubConnection {
    /// Open a SUB connection on `endpoints`. Nothing is delivered until
    /// [`subscribe`](Self::subscribe) is called.
    ///
    /// # Errors
    ///
    /// Any setup error of [`Connection::open`].
    pub fn open(
        registry: &Registry,
        endpoints: Vec<Endpoint>,
        options: &SocketOptions,
        handler: Rc<dyn SubHandler>,
    ) -> Result<Self> {
        let connection = Connection::open(
            registry,
            SocketType::Sub,
            endpoints,
            options,
            Rc::new(SubState { handler }),
        )?;
        Ok(Self { connection })
    }

    /// Receive publications whose tag starts with `tag`. May be called
    /// several times; an empty tag receives everything.
    ///
    /// # Errors
    ///
    /// [`TrellisError::InvalidState`](trellis_core::error::TrellisError::InvalidState)
    /// unless active, or a socket error.
    pub fn subscribe(&self, tag: impl Into<Bytes>) -> Result<()> {
        self.connection
            .set_socket_option(SocketOption::Subscribe(tag.into()))
    }

    /// Undo one [`subscribe`](Self::subscribe) call for `tag`.
    ///
    /// # Errors
    ///
    /// [`TrellisError::InvalidState`](trellis_core::error::TrellisError::InvalidState)
    /// unless active, or a socket error.
    pub fn unsubscribe(&self, tag: impl Into<Bytes>) -> Result<()> {
        self.connection
            .set_socket_option(SocketOption::Unsubscribe(tag.into()))
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

    fn b(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_split_single_frame() {
        assert_eq!(
            split_publication(vec![b("tag\0hello\0world")]),
            Some((b("hello\0world"), b("tag")))
        );
    }

    #[test]
    fn test_split_two_frames() {
        assert_eq!(
            split_publication(vec![b("tag"), b("hello")]),
            Some((b("hello"), b("tag")))
        );
    }

    #[test]
    fn test_split_without_separator() {
        assert_eq!(
            split_publication(vec![b("untagged")]),
            Some((b("untagged"), Bytes::new()))
        );
    }

    #[test]
    fn test_split_empty_tag() {
        assert_eq!(
            split_publication(vec![b("\0body")]),
            Some((b("body"), Bytes::new()))
        );
    }
}
