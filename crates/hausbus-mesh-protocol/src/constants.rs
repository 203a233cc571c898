//! Protocol constants for the radio's framed API mode.

// ============================================================================
// Framing
// ============================================================================

/// Frame delimiter, first byte of every API frame.
pub const FRAME_DELIMITER: u8 = 0x7E;

/// Escape introducer.
pub const ESCAPE: u8 = 0x7D;

/// XOR mask applied to an escaped byte.
pub const ESCAPE_MASK: u8 = 0x20;

/// Bytes that must be escaped wherever they occur after the delimiter
/// (delimiter, escape introducer, XON, XOFF).
pub const ILLEGAL_BYTES: [u8; 4] = [0x7E, 0x7D, 0x11, 0x13];

/// Largest frame body the codec will accept. A declared length above this is
/// treated as a corrupt frame, not something to wait for.
pub const MAX_FRAME_BODY: usize = 256;

// ============================================================================
// API Frame Types
// ============================================================================

/// Transmit request (host → radio): `[0x01, frame_id, dest_hi, dest_lo, payload...]`.
pub const API_TX_REQUEST: u8 = 0x01;

/// Received packet (radio → host):
/// `[0x80, hw_addr(8), short_hi, short_lo, payload...]`.
pub const API_RX_PACKET: u8 = 0x80;

/// Transmit status (radio → host): `[0x89, frame_id, status]`.
pub const API_TX_STATUS: u8 = 0x89;

/// Modem status (radio → host): `[0x8A, status]`.
pub const API_MODEM_STATUS: u8 = 0x8A;

/// Transmit status value meaning the frame was delivered.
pub const TX_STATUS_OK: u8 = 0x00;

/// Frame id value that never identifies a transaction.
pub const FRAME_ID_NONE: u8 = 0x00;
