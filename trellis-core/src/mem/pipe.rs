//! One direction-pair of channels between two in-memory sockets.

use bytes::Bytes;
use flume::{Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::RwLock;
use std::sync::Arc;

use super::subscription::SubscriptionSet;
use crate::socket_type::SocketType;

/// A whole multipart message as it travels through a pipe.
pub type MemMessage = Vec<Bytes>;

/// Shared subscription filter of a SUB socket.
pub type SharedFilter = Arc<RwLock<SubscriptionSet>>;

/// Outcome of offering a message to a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    Sent,
    Full,
    Closed,
}

/// Outcome of polling a pipe for a message.
pub(crate) enum Poll {
    Message(MemMessage),
    Empty,
    Closed,
}

/// Local end of a link to one peer.
///
/// Messages travel whole: the high water mark counts messages, not frames.
pub(crate) struct Pipe {
    tx: Sender<MemMessage>,
    rx: Receiver<MemMessage>,
    peer_identity: Bytes,
    peer_type: SocketType,
    peer_filter: SharedFilter,
}

impl Pipe {
    pub(crate) fn new(
        tx: Sender<MemMessage>,
        rx: Receiver<MemMessage>,
        peer_identity: Bytes,
        peer_type: SocketType,
        peer_filter: SharedFilter,
    ) -> Self {
        Self {
            tx,
            rx,
            peer_identity,
            peer_type,
            peer_filter,
        }
    }

    pub(crate) fn peer_identity(&self) -> &Bytes {
        &self.peer_identity
    }

    /// Whether a message with this first frame should reach the peer.
    pub(crate) fn accepts(&self, topic: &[u8]) -> bool {
        self.peer_type != SocketType::Sub || self.peer_filter.read().matches(topic)
    }

    pub(crate) fn has_room(&self) -> bool {
        !self.tx.is_full() && !self.tx.is_disconnected()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    pub(crate) fn offer(&self, message: MemMessage) -> Offer {
        match self.tx.try_send(message) {
            Ok(()) => Offer::Sent,
            Err(TrySendError::Full(_)) => Offer::Full,
            Err(TrySendError::Disconnected(_)) => Offer::Closed,
        }
    }

    pub(crate) fn poll(&self) -> Poll {
        match self.rx.try_recv() {
            Ok(message) => Poll::Message(message),
            Err(TryRecvError::Empty) => Poll::Empty,
            Err(TryRecvError::Disconnected) => Poll::Closed,
        }
    }
}

/// Creates a bounded channel, or an unbounded one for a zero high water mark.
pub(crate) fn channel(hwm: usize) -> (Sender<MemMessage>, Receiver<MemMessage>) {
    if hwm == 0 {
        flume::unbounded()
    } else {
        flume::bounded(hwm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe_pair(hwm: usize) -> (Pipe, Pipe) {
        let (a_tx, b_rx) = channel(hwm);
        let (b_tx, a_rx) = channel(hwm);
        let filter = SharedFilter::default();
        (
            Pipe::new(a_tx, a_rx, Bytes::from_static(b"b"), SocketType::Dealer, filter.clone()),
            Pipe::new(b_tx, b_rx, Bytes::from_static(b"a"), SocketType::Dealer, filter),
        )
    }

    #[test]
    fn test_bounded_pipe_reports_full() {
        let (a, b) = pipe_pair(1);
        assert!(a.has_room());
        assert_eq!(a.offer(vec![Bytes::from_static(b"1")]), Offer::Sent);
        assert!(!a.has_room());
        assert_eq!(a.offer(vec![Bytes::from_static(b"2")]), Offer::Full);

        assert!(b.has_pending());
        assert!(matches!(b.poll(), Poll::Message(m) if m[0] == "1"));
        assert!(matches!(b.poll(), Poll::Empty));
    }

    #[test]
    fn test_dropped_peer_closes_pipe() {
        let (a, b) = pipe_pair(0);
        assert_eq!(a.offer(vec![Bytes::from_static(b"last")]), Offer::Sent);
        drop(a);

        assert!(matches!(b.poll(), Poll::Message(_)));
        assert!(matches!(b.poll(), Poll::Closed));
        assert_eq!(b.offer(vec![Bytes::new()]), Offer::Closed);
    }

    #[test]
    fn test_sub_peer_filters_topics() {
        let (tx, rx) = channel(0);
        let filter = SharedFilter::default();
        let pipe = Pipe::new(tx, rx, Bytes::new(), SocketType::Sub, filter.clone());
        assert!(!pipe.accepts(b"news"));

        filter.write().subscribe(Bytes::from_static(b"ne"));
        assert!(pipe.accepts(b"news"));
        assert!(!pipe.accepts(b"sports"));
    }
}
