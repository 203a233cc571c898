//! API message types exchanged with the local radio.

use crate::addresses::{HardwareAddress, ShortAddress};
use crate::constants::*;
use crate::error::MeshProtocolError;

/// A transmit request addressed to a remote radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// Frame id echoed back in the matching [`ApiEvent::TxStatus`].
    pub frame_id: u8,
    /// Destination short address.
    pub dest: ShortAddress,
    /// Board-protocol payload carried to the remote board.
    pub payload: Vec<u8>,
}

impl TxRequest {
    /// Encode the request as a frame body (no envelope).
    pub fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(4 + self.payload.len());
        body.push(API_TX_REQUEST);
        body.push(self.frame_id);
        body.extend_from_slice(&self.dest.0.to_be_bytes());
        body.extend_from_slice(&self.payload);
        body
    }
}

/// An event frame received from the local radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiEvent {
    /// Radio state change (joined, disassociated, ...).
    ModemStatus {
        /// Vendor status code.
        status: u8,
    },

    /// Outcome of an earlier [`TxRequest`].
    TxStatus {
        /// Frame id of the transmit request this status answers.
        frame_id: u8,
        /// Vendor status code; [`TX_STATUS_OK`] means delivered.
        status: u8,
    },

    /// A packet received from a remote radio.
    Rx {
        /// Sender's fixed hardware address.
        hardware: HardwareAddress,
        /// Sender's short address.
        short: ShortAddress,
        /// Board-protocol payload.
        payload: Vec<u8>,
    },
}

impl ApiEvent {
    /// Decode an event from a verified frame body.
    pub fn decode(body: &[u8]) -> Result<ApiEvent, MeshProtocolError> {
        let Some(&frame_type) = body.first() else {
            return Err(MeshProtocolError::EmptyFrame);
        };
        let truncated = || MeshProtocolError::TruncatedApiFrame {
            frame_type,
            len: body.len(),
        };

        match frame_type {
            API_MODEM_STATUS => {
                if body.len() < 2 {
                    return Err(truncated());
                }
                Ok(ApiEvent::ModemStatus { status: body[1] })
            }

            API_TX_STATUS => {
                if body.len() < 3 {
                    return Err(truncated());
                }
                Ok(ApiEvent::TxStatus {
                    frame_id: body[1],
                    status: body[2],
                })
            }

            API_RX_PACKET => {
                // type + 8-byte hardware address + 2-byte short address
                if body.len() < 11 {
                    return Err(truncated());
                }
                let mut hardware = [0u8; 8];
                hardware.copy_from_slice(&body[1..9]);
                let short = u16::from_be_bytes([body[9], body[10]]);
                Ok(ApiEvent::Rx {
                    hardware: HardwareAddress(hardware),
                    short: ShortAddress(short),
                    payload: body[11..].to_vec(),
                })
            }

            other => Err(MeshProtocolError::UnknownApiFrame(other)),
        }
    }
}
