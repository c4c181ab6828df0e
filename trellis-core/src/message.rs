//! Multipart messages and the frames they are made of.
//!
//! A [`Message`] is an ordered sequence of [`Frame`]s that travels as one
//! unit. Frames of one message are never interleaved with another message's
//! frames on the same socket.

use bytes::Bytes;
use std::io;

use crate::error::{Result, TrellisError};

/// Atomic unit of transmission.
pub type Frame = Bytes;

/// A multipart message with ergonomic frame construction.
///
/// # Examples
///
/// ```
/// use trellis_core::message::Message;
///
/// // ROUTER envelope: [identity] [empty] [data]
/// let msg = Message::new()
///     .push(&b"client-id"[..])
///     .push_empty()
///     .push_str("request");
/// assert_eq!(msg.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Frame>,
}

impl Message {
    /// Create a new empty message.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Create a message from existing frames.
    #[must_use]
    pub const fn from_frames(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Create a single-frame message.
    #[must_use]
    pub fn single(frame: impl Into<Frame>) -> Self {
        Self {
            frames: vec![frame.into()],
        }
    }

    /// Add a frame from any type that can be converted to `Bytes`.
    #[must_use]
    pub fn push(mut self, frame: impl Into<Frame>) -> Self {
        self.frames.push(frame.into());
        self
    }

    /// Add a string frame (UTF-8 encoded).
    #[must_use]
    pub fn push_str(mut self, s: &str) -> Self {
        self.frames.push(Bytes::copy_from_slice(s.as_bytes()));
        self
    }

    /// Add an empty delimiter frame.
    #[must_use]
    pub fn push_empty(mut self) -> Self {
        self.frames.push(Bytes::new());
        self
    }

    /// Get the number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if the message has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total payload bytes across all frames.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }

    /// Get a reference to the frames.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Consume the message and return the frames.
    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    /// Position of the first empty (delimiter) frame.
    #[must_use]
    pub fn delimiter_index(&self) -> Option<usize> {
        self.frames.iter().position(Bytes::is_empty)
    }

    /// Split into outbound queue entries, tagging all but the last with `more`.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::EmptyMessage`] if there are no frames.
    pub fn into_outbound(self) -> Result<impl Iterator<Item = OutboundFrame>> {
        if self.frames.is_empty() {
            return Err(TrellisError::EmptyMessage);
        }
        let last = self.frames.len() - 1;
        Ok(self
            .frames
            .into_iter()
            .enumerate()
            .map(move |(i, data)| OutboundFrame {
                data,
                more: i < last,
            }))
    }

    /// Try to parse a frame as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame doesn't exist or isn't valid UTF-8.
    pub fn parse_frame_str(&self, index: usize) -> io::Result<&str> {
        let frame = self.frames.get(index).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "Frame index out of bounds")
        })?;

        std::str::from_utf8(frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl From<Vec<Frame>> for Message {
    fn from(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

impl From<Message> for Vec<Frame> {
    fn from(msg: Message) -> Self {
        msg.frames
    }
}

impl From<&'static str> for Message {
    fn from(s: &'static str) -> Self {
        Self::single(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Bytes> for Message {
    fn from(frame: Bytes) -> Self {
        Self::single(frame)
    }
}

/// One entry of a connection's outbound FIFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Frame payload
    pub data: Frame,
    /// More frames of the same message follow
    pub more: bool,
}
