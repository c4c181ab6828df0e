use bytes::Bytes;
use smallvec::SmallVec;

use crate::error::TrellisError;
use crate::message::Message;

/// Collects inbound frames until a complete multipart message is formed.
///
/// Invariants:
/// - Frames are appended in-order
/// - A message completes when `more == false`
/// - The byte limit is enforced eagerly, before the message completes
///
/// Owned by a single connection's read loop; not shared.
#[derive(Debug)]
pub struct MultipartBuffer {
    frames: SmallVec<[Bytes; 4]>,
    byte_count: usize,
    max_bytes: Option<usize>,
}

impl MultipartBuffer {
    /// Create a new buffer, optionally capping total message size in bytes.
    pub fn new(max_bytes: Option<usize>) -> Self {
        Self {
            frames: SmallVec::new(),
            byte_count: 0,
            max_bytes,
        }
    }

    /// Push a frame into the buffer.
    ///
    /// Returns:
    /// - `Ok(None)` if the message is not complete
    /// - `Ok(Some(Message))` if a full message was assembled
    /// - `Err(TrellisError::MessageTooLarge)` when the limit is exceeded
    pub fn push_frame(&mut self, frame: Bytes, more: bool) -> Result<Option<Message>, TrellisError> {
        self.byte_count += frame.len();
        if let Some(max) = self.max_bytes {
            if self.byte_count > max {
                let size = self.byte_count;
                self.reset();
                return Err(TrellisError::MessageTooLarge { size, max });
            }
        }

        self.frames.push(frame);

        if more {
            Ok(None)
        } else {
            let frames = std::mem::take(&mut self.frames).into_vec();
            self.reset();
            Ok(Some(Message::from_frames(frames)))
        }
    }

    /// Number of frames of a partially received message.
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    fn reset(&mut self) {
        self.frames.clear();
        self.byte_count = 0;
    }
}
