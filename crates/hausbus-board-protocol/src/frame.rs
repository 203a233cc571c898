//! Sync marker scanning and message framing.
//!
//! Before sync, the read buffer is searched *anywhere* for a marker: a board
//! that reset mid-stream leaves arbitrary garbage in front of its next probe,
//! and that garbage must never be parsed as messages. After sync, messages
//! are framed as `[type:1][len:1][payload:len]` and only consumed once fully
//! buffered.

use crate::constants::*;
use crate::error::ProtocolError;

/// Which sync marker was found in a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMarker {
    /// The half-sync marker (peer has not seen our probe yet).
    Half,
    /// The full-sync marker (stream aligned).
    Full,
}

impl SyncMarker {
    /// The marker's wire bytes.
    pub fn bytes(&self) -> &'static [u8; SYNC_MARKER_LEN] {
        match self {
            SyncMarker::Half => &HALF_SYNC_MARKER,
            SyncMarker::Full => &FULL_SYNC_MARKER,
        }
    }
}

/// Scan `buf` for the earliest sync marker of either kind.
///
/// Returns the marker and the offset one past its end. Both markers share a
/// prefix and differ in one byte, so a single window scan finds either.
pub fn find_sync(buf: &[u8]) -> Option<(SyncMarker, usize)> {
    for (pos, window) in buf.windows(SYNC_MARKER_LEN).enumerate() {
        if window == FULL_SYNC_MARKER {
            return Some((SyncMarker::Full, pos + SYNC_MARKER_LEN));
        }
        if window == HALF_SYNC_MARKER {
            return Some((SyncMarker::Half, pos + SYNC_MARKER_LEN));
        }
    }
    None
}

/// A framed message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message type byte.
    pub msg_type: u8,
    /// Message payload.
    pub payload: Vec<u8>,
}

/// Whether a message type byte is one the protocol knows.
fn is_known_type(msg_type: u8) -> bool {
    matches!(msg_type, REPORT_DIGITAL | REPORT_ANALOG | REPORT_VIRTUAL)
}

/// Try to take one complete message off the front of `buf`.
///
/// Returns `Ok(Some((message, consumed)))` when a full message is buffered,
/// `Ok(None)` when more bytes are needed, and `Err` on corruption (unknown
/// type byte, or a declared length over [`MAX_PAYLOAD_LEN`]). Corruption is
/// the caller's cue to force a resync.
pub fn take_message(buf: &[u8]) -> Result<Option<(RawMessage, usize)>, ProtocolError> {
    let Some(&msg_type) = buf.first() else {
        return Ok(None);
    };
    if !is_known_type(msg_type) {
        return Err(ProtocolError::UnknownMessageType(msg_type));
    }
    let Some(&len) = buf.get(1) else {
        return Ok(None);
    };
    let len = len as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLong {
            max: MAX_PAYLOAD_LEN,
            actual: len,
        });
    }
    if buf.len() < MESSAGE_HEADER_LEN + len {
        return Ok(None);
    }
    let payload = buf[MESSAGE_HEADER_LEN..MESSAGE_HEADER_LEN + len].to_vec();
    Ok(Some((
        RawMessage { msg_type, payload },
        MESSAGE_HEADER_LEN + len,
    )))
}
