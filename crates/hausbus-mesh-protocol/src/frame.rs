//! Frame encoding/decoding for the radio's API mode.
//!
//! Outbound frames are built with [`encode_frame`]. Inbound bytes are fed to
//! an [`ApiFrameCodec`], which reassembles frames from a stream that may
//! contain garbage between frames, partial frames, and escape sequences
//! anywhere after the delimiter (including inside the length field).

use bytes::{Buf, BytesMut};

use crate::constants::*;
use crate::error::MeshProtocolError;

/// Compute the frame checksum: `0xFF - (sum(body) % 256)`.
pub fn checksum(body: &[u8]) -> u8 {
    let sum: u32 = body.iter().map(|&b| u32::from(b)).sum();
    0xFF - (sum % 256) as u8
}

/// Verify a frame checksum: `(checksum + sum(body)) % 256` must be `0xFF`.
pub fn check_checksum(body: &[u8], received: u8) -> bool {
    let mut s = received;
    for &b in body {
        s = s.wrapping_add(b);
    }
    s == 0xFF
}

/// Escape every illegal byte in `data` as `0x7D, byte ^ 0x20`.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if ILLEGAL_BYTES.contains(&b) {
            out.push(ESCAPE);
            out.push(b ^ ESCAPE_MASK);
        } else {
            out.push(b);
        }
    }
    out
}

/// Undo [`escape`]. Returns `None` when the data ends in a dangling escape
/// introducer.
pub fn unescape(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == ESCAPE {
            let &e = data.get(i + 1)?;
            out.push(e ^ ESCAPE_MASK);
            i += 2;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    Some(out)
}

/// Build a complete wire frame around `body`: delimiter, escaped length,
/// escaped body, escaped checksum.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    debug_assert!(body.len() <= MAX_FRAME_BODY);
    let len = body.len() as u16;
    let mut unescaped = Vec::with_capacity(body.len() + 3);
    unescaped.push((len >> 8) as u8);
    unescaped.push(len as u8);
    unescaped.extend_from_slice(body);
    unescaped.push(checksum(body));

    let mut out = Vec::with_capacity(unescaped.len() + 1);
    out.push(FRAME_DELIMITER);
    out.extend_from_slice(&escape(&unescaped));
    out
}

/// Result of peeking one unescaped byte out of the reassembly buffer.
enum Peek {
    /// A byte was available; `next` is the buffer position after it.
    Byte { value: u8, next: usize },
    /// The buffer ends mid-byte (or mid-escape).
    NeedMore,
}

/// A codec reassembling API frames from a byte stream.
///
/// Feed received bytes with [`push`](Self::push), then drain frames with
/// [`next_frame`](Self::next_frame) until it returns `Ok(None)`. A checksum
/// failure consumes the bad frame and surfaces as an error so the caller can
/// log it and keep going.
#[derive(Debug, Default)]
pub struct ApiFrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl ApiFrameCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        ApiFrameCodec {
            buffer: BytesMut::with_capacity(MAX_FRAME_BODY * 2),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Peek the unescaped byte starting at buffer position `pos`.
    fn peek_unescaped(&self, pos: usize) -> Peek {
        let Some(&b) = self.buffer.get(pos) else {
            return Peek::NeedMore;
        };
        if b == ESCAPE {
            match self.buffer.get(pos + 1) {
                Some(&e) => Peek::Byte {
                    value: e ^ ESCAPE_MASK,
                    next: pos + 2,
                },
                None => Peek::NeedMore,
            }
        } else {
            Peek::Byte {
                value: b,
                next: pos + 1,
            }
        }
    }

    /// Try to take the next complete frame body off the stream.
    ///
    /// Returns `Ok(Some(body))` for a verified frame, `Ok(None)` when more
    /// bytes are needed, and `Err` for a frame that was consumed but failed
    /// verification.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, MeshProtocolError> {
        // Discard garbage before the next delimiter.
        while !self.buffer.is_empty() && self.buffer[0] != FRAME_DELIMITER {
            self.buffer.advance(1);
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut pos = 1;
        let len_hi = match self.peek_unescaped(pos) {
            Peek::Byte { value, next } => {
                pos = next;
                value
            }
            Peek::NeedMore => return Ok(None),
        };
        let len_lo = match self.peek_unescaped(pos) {
            Peek::Byte { value, next } => {
                pos = next;
                value
            }
            Peek::NeedMore => return Ok(None),
        };
        let declared = usize::from(len_hi) << 8 | usize::from(len_lo);
        if declared > MAX_FRAME_BODY {
            // Not a plausible frame; drop the delimiter and rescan.
            self.buffer.advance(1);
            return Err(MeshProtocolError::BodyTooLong {
                max: MAX_FRAME_BODY,
                declared,
            });
        }

        // Body plus trailing checksum.
        let mut content = Vec::with_capacity(declared + 1);
        for _ in 0..declared + 1 {
            match self.peek_unescaped(pos) {
                Peek::Byte { value, next } => {
                    pos = next;
                    content.push(value);
                }
                Peek::NeedMore => return Ok(None),
            }
        }

        self.buffer.advance(pos);
        let received = content.pop().unwrap_or(0);
        if !check_checksum(&content, received) {
            return Err(MeshProtocolError::ChecksumMismatch {
                computed: checksum(&content),
                received,
            });
        }
        Ok(Some(content))
    }
}
