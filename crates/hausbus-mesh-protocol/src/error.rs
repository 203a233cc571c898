//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when decoding radio API frames.
///
/// All of these are recoverable at the tunnel level: the offending frame is
/// dropped and the stream continues with the next delimiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshProtocolError {
    /// Frame checksum verification failed; the frame has been consumed.
    #[error("frame checksum mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        /// Checksum computed over the received body.
        computed: u8,
        /// Checksum byte carried by the frame.
        received: u8,
    },

    /// Frame declared a body longer than the codec accepts.
    #[error("frame body too long: maximum {max} bytes, declared {declared}")]
    BodyTooLong {
        /// Maximum accepted body length.
        max: usize,
        /// Declared body length.
        declared: usize,
    },

    /// API frame body was too short for its type.
    #[error("truncated API frame: type 0x{frame_type:02X}, {len} bytes")]
    TruncatedApiFrame {
        /// API frame type byte.
        frame_type: u8,
        /// Actual body length.
        len: usize,
    },

    /// Unknown API frame type byte.
    #[error("unknown API frame type: 0x{0:02X}")]
    UnknownApiFrame(u8),

    /// Empty frame body (a frame must at least carry its type byte).
    #[error("empty frame body")]
    EmptyFrame,
}
