//! Stream frame codec for the decision protocol.
//!
//! Frames multiplex many in-flight requests over one TCP stream. Each
//! frame is a 4-byte little-endian length, a 4-byte little-endian request
//! id and the request or response payload; the length covers the id and
//! the payload. The id correlates a response with its caller: the server
//! echoes the id it received.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Length of the frame header (u32 length prefix).
const HEADER_LEN: usize = 4;

/// Length of the request id carried by every frame.
const ID_LEN: usize = 4;

/// Largest frame the codec accepts by default.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frame codec error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// The peer announced or submitted a frame above the size bound.
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Announced frame size.
        size: usize,
        /// Configured bound.
        max: usize,
    },

    /// The peer sent a frame too short to carry a request id.
    #[error("frame of {size} bytes is shorter than a request id")]
    FrameTooShort {
        /// Announced frame size.
        size: usize,
    },

    /// Transport failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One multiplexed frame: request id plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionFrame {
    /// Correlation id chosen by the requesting side.
    pub id: u32,
    /// Marshaled request or response bytes.
    pub payload: Bytes,
}

impl DecisionFrame {
    /// Creates a frame.
    #[must_use]
    pub fn new(id: u32, payload: Bytes) -> Self {
        Self { id, payload }
    }
}

/// Length-prefixed frame codec with a validated size bound.
///
/// The announced length is checked before any allocation so a hostile
/// peer cannot make the reader reserve arbitrary memory.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Creates a codec with the default size bound.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Creates a codec with a custom size bound.
    #[must_use]
    pub const fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// The configured size bound.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = DecisionFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DecisionFrame>, FrameError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }
        if length < ID_LEN {
            return Err(FrameError::FrameTooShort { size: length });
        }

        let total = HEADER_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let id = src.get_u32_le();
        let payload = src.split_to(length - ID_LEN).freeze();

        Ok(Some(DecisionFrame { id, payload }))
    }
}

impl Encoder<DecisionFrame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: DecisionFrame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let length = ID_LEN + frame.payload.len();
        if length > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        dst.reserve(HEADER_LEN + length);
        #[allow(clippy::cast_possible_truncation)] // bounded by max_frame_size
        dst.put_u32_le(length as u32);
        dst.put_u32_le(frame.id);
        dst.extend_from_slice(&frame.payload);

        Ok(())
    }
}
