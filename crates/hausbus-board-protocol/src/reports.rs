//! Reports sent by a board after sync.

use crate::constants::*;
use crate::error::ProtocolError;
use crate::frame::RawMessage;
use crate::ports::{AddressingWindows, PortClass, PortName};

/// A decoded port reading reported by a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// Digital pin state.
    Digital {
        /// Wire pin number.
        pin: u8,
        /// Pin state, 0 or 1.
        state: u8,
    },
    /// Analog pin reading.
    Analog {
        /// Wire pin number.
        pin: u8,
        /// 10-bit reading.
        value: u16,
    },
    /// Virtual pin reading.
    Virtual {
        /// Wire pin number.
        pin: u8,
        /// Device-specific reading.
        value: u16,
    },
}

impl Report {
    /// Decode a report from a framed message.
    pub fn decode(msg: &RawMessage) -> Result<Report, ProtocolError> {
        let expect_len = |expected: usize| {
            if msg.payload.len() == expected {
                Ok(())
            } else {
                Err(ProtocolError::ReportLengthMismatch {
                    expected,
                    actual: msg.payload.len(),
                })
            }
        };

        match msg.msg_type {
            REPORT_DIGITAL => {
                expect_len(2)?;
                Ok(Report::Digital {
                    pin: msg.payload[0],
                    state: msg.payload[1],
                })
            }
            REPORT_ANALOG => {
                expect_len(3)?;
                Ok(Report::Analog {
                    pin: msg.payload[0],
                    value: u16::from_be_bytes([msg.payload[1], msg.payload[2]]),
                })
            }
            REPORT_VIRTUAL => {
                expect_len(3)?;
                Ok(Report::Virtual {
                    pin: msg.payload[0],
                    value: u16::from_be_bytes([msg.payload[1], msg.payload[2]]),
                })
            }
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }

    /// The port class this report belongs to.
    pub fn class(&self) -> PortClass {
        match self {
            Report::Digital { .. } => PortClass::Digital,
            Report::Analog { .. } => PortClass::Analog,
            Report::Virtual { .. } => PortClass::Virtual,
        }
    }

    /// The wire pin number.
    pub fn pin(&self) -> u8 {
        match self {
            Report::Digital { pin, .. }
            | Report::Analog { pin, .. }
            | Report::Virtual { pin, .. } => *pin,
        }
    }

    /// The reported value.
    pub fn value(&self) -> u16 {
        match self {
            Report::Digital { state, .. } => u16::from(*state),
            Report::Analog { value, .. } | Report::Virtual { value, .. } => *value,
        }
    }

    /// Map the wire pin back to a symbolic port through `windows`.
    ///
    /// `None` means the reading does not belong to the caller's board slice;
    /// a link treats that as desync.
    pub fn port(&self, windows: &AddressingWindows) -> Option<PortName> {
        windows.symbolic(self.class(), self.pin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortWindow;

    #[test]
    fn test_decode_digital_report() {
        let msg = RawMessage {
            msg_type: REPORT_DIGITAL,
            payload: vec![37, 1],
        };
        let report = Report::decode(&msg).unwrap();
        assert_eq!(report, Report::Digital { pin: 37, state: 1 });
        assert_eq!(report.value(), 1);
        assert_eq!(
            report.port(&AddressingWindows::open()),
            Some("d37".parse().unwrap())
        );
    }

    #[test]
    fn test_decode_analog_report() {
        let msg = RawMessage {
            msg_type: REPORT_ANALOG,
            payload: vec![3, 0x02, 0x9A],
        };
        let report = Report::decode(&msg).unwrap();
        assert_eq!(report, Report::Analog { pin: 3, value: 666 });
    }

    #[test]
    fn test_decode_rejects_wrong_payload_length() {
        let msg = RawMessage {
            msg_type: REPORT_DIGITAL,
            payload: vec![37],
        };
        assert_eq!(
            Report::decode(&msg).unwrap_err(),
            ProtocolError::ReportLengthMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_report_port_maps_through_window() {
        // Remote board: owns d20..d29, wire pins 0..9.
        let windows = AddressingWindows {
            digital: PortWindow {
                start: 20,
                count: Some(10),
                offset: -20,
            },
            ..AddressingWindows::open()
        };
        let report = Report::Digital { pin: 4, state: 0 };
        assert_eq!(report.port(&windows), Some("d24".parse().unwrap()));

        // Wire pin outside the slice is rejected.
        let report = Report::Digital { pin: 15, state: 0 };
        assert_eq!(report.port(&windows), None);
    }
}
