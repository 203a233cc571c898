//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with the board serial protocol.
///
/// Every variant here signals *stream corruption* rather than an application
/// error: the owning link is expected to respond by forcing a resync, not by
/// propagating the error upward.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A framed message declared a payload longer than the protocol allows.
    #[error("declared payload too long: maximum {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum allowed payload length.
        max: usize,
        /// Declared payload length.
        actual: usize,
    },

    /// Unknown message type byte at a message boundary.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// A report payload did not have the length its type requires.
    #[error("report payload length mismatch: expected {expected} bytes, got {actual}")]
    ReportLengthMismatch {
        /// Expected payload length for this report type.
        expected: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// A port name string could not be parsed.
    #[error("invalid port name: {0:?}")]
    BadPortName(String),
}
