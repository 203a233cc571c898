//! Protocol constants
//!
//! These constants define the sync markers, command codes, report codes, and
//! framing limits of the hausbus board serial protocol.

// ============================================================================
// Sync Markers
// ============================================================================

/// Length of both sync markers in bytes.
pub const SYNC_MARKER_LEN: usize = 4;

/// Half-sync marker. Sent as a probe while unsynced; receiving it means the
/// peer has not yet seen one of our own probes.
pub const HALF_SYNC_MARKER: [u8; SYNC_MARKER_LEN] = [0x55, 0xAA, 0x00, 0x5A];

/// Full-sync marker. Differs from [`HALF_SYNC_MARKER`] in exactly one byte;
/// receiving it means the peer has seen our probe and the stream is aligned.
pub const FULL_SYNC_MARKER: [u8; SYNC_MARKER_LEN] = [0x55, 0xAA, 0x01, 0x5A];

// ============================================================================
// Command Codes (middleware → board)
// ============================================================================

/// Reset the board to a blank state. Always the first command after sync.
pub const CMD_RESET_BOARD: u8 = 0x20;
/// Configure a pin as input or output.
pub const CMD_SET_PIN_MODE: u8 = 0x21;
/// Configure a virtual (software-emulated) pin with a device-specific payload.
pub const CMD_SET_VIRTUAL_PIN_MODE: u8 = 0x22;
/// Drive an output pin to a value.
pub const CMD_SET_PIN_OUTPUT: u8 = 0x23;
/// Ask the board to report an input pin periodically.
pub const CMD_REGISTER_PIN_LISTENER: u8 = 0x24;

// ============================================================================
// Report Codes (board → middleware)
// ============================================================================

/// Digital pin state report: `[pin, state]`.
pub const REPORT_DIGITAL: u8 = 0x01;
/// Analog pin reading report: `[pin, hi, lo]`.
pub const REPORT_ANALOG: u8 = 0x02;
/// Virtual pin reading report: `[pin, hi, lo]`.
pub const REPORT_VIRTUAL: u8 = 0x03;

// ============================================================================
// Framing
// ============================================================================

/// Maximum payload length a framed message may declare. Anything larger is
/// stream corruption.
pub const MAX_PAYLOAD_LEN: usize = 32;

/// Size of the `[type][len]` message header.
pub const MESSAGE_HEADER_LEN: usize = 2;
