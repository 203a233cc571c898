//! Commands that can be sent to a board.

use crate::constants::*;
use crate::ports::{AddressingWindows, PortName};

/// Pin mode for [`Command::SetPinMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// The board reads the pin and reports it.
    Input,
    /// The middleware drives the pin.
    Output,
}

impl From<PinMode> for u8 {
    fn from(mode: PinMode) -> Self {
        match mode {
            PinMode::Input => 0,
            PinMode::Output => 1,
        }
    }
}

/// Commands that can be sent to a board.
///
/// Encoding resolves the port through the caller's [`AddressingWindows`]; a
/// port outside the windows encodes to an *empty* byte sequence, which the
/// caller queues as nothing. This is deliberate: commands are broadcast to
/// every link and each link keeps only the slice addressed to its board.
#[derive(Debug, Clone)]
pub enum Command {
    /// Reset the board to a blank state.
    ResetBoard,

    /// Configure a pin as input or output.
    SetPinMode {
        /// Port to configure.
        port: PortName,
        /// Desired mode.
        mode: PinMode,
    },

    /// Configure a virtual pin with a device-specific setup payload.
    SetVirtualPinMode {
        /// Virtual port to configure.
        port: PortName,
        /// Opaque setup payload interpreted by the on-board device emulation.
        setup: Vec<u8>,
    },

    /// Drive an output pin to a value.
    SetPinOutput {
        /// Port to drive.
        port: PortName,
        /// Output value (0/1 digital, 0-255 PWM, 0-1023 analog).
        value: u16,
    },

    /// Ask the board to report an input pin every `interval_ms` milliseconds.
    RegisterPinListener {
        /// Port to listen on.
        port: PortName,
        /// Reporting interval in milliseconds.
        interval_ms: u16,
    },
}

impl Command {
    /// Get the command code for this command.
    pub fn code(&self) -> u8 {
        match self {
            Command::ResetBoard => CMD_RESET_BOARD,
            Command::SetPinMode { .. } => CMD_SET_PIN_MODE,
            Command::SetVirtualPinMode { .. } => CMD_SET_VIRTUAL_PIN_MODE,
            Command::SetPinOutput { .. } => CMD_SET_PIN_OUTPUT,
            Command::RegisterPinListener { .. } => CMD_REGISTER_PIN_LISTENER,
        }
    }

    /// Encode the command as a framed message: `[code][len][payload]`.
    ///
    /// Returns an empty vector when the command's port does not resolve
    /// through `windows`.
    pub fn encode(&self, windows: &AddressingWindows) -> Vec<u8> {
        let payload = match self.payload(windows) {
            Some(payload) => payload,
            None => return Vec::new(),
        };
        debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);

        let mut buf = Vec::with_capacity(MESSAGE_HEADER_LEN + payload.len());
        buf.push(self.code());
        buf.push(payload.len() as u8);
        buf.extend_from_slice(&payload);
        buf
    }

    /// Build the command payload, resolving the port through `windows`.
    fn payload(&self, windows: &AddressingWindows) -> Option<Vec<u8>> {
        match self {
            Command::ResetBoard => Some(Vec::new()),

            Command::SetPinMode { port, mode } => {
                let pin = windows.resolve(port)?;
                Some(vec![port.class.code(), pin, (*mode).into()])
            }

            Command::SetVirtualPinMode { port, setup } => {
                let pin = windows.resolve(port)?;
                let mut payload = Vec::with_capacity(1 + setup.len());
                payload.push(pin);
                payload.extend_from_slice(setup);
                Some(payload)
            }

            Command::SetPinOutput { port, value } => {
                let pin = windows.resolve(port)?;
                let [hi, lo] = value.to_be_bytes();
                Some(vec![port.class.code(), pin, hi, lo])
            }

            Command::RegisterPinListener { port, interval_ms } => {
                let pin = windows.resolve(port)?;
                let [hi, lo] = interval_ms.to_be_bytes();
                Some(vec![port.class.code(), pin, hi, lo])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortWindow;

    #[test]
    fn test_reset_board_encoding() {
        let encoded = Command::ResetBoard.encode(&AddressingWindows::open());
        assert_eq!(encoded, vec![CMD_RESET_BOARD, 0]);
    }

    #[test]
    fn test_set_pin_output_with_offset() {
        // Spec example: offset +20 with a 10-wide window starting at 10.
        let windows = AddressingWindows {
            digital: PortWindow {
                start: 10,
                count: Some(10),
                offset: 20,
            },
            ..AddressingWindows::open()
        };

        let cmd = Command::SetPinOutput {
            port: "d12".parse().unwrap(),
            value: 1,
        };
        let encoded = cmd.encode(&windows);
        assert_eq!(encoded, vec![CMD_SET_PIN_OUTPUT, 4, 0, 32, 0, 1]);
    }

    #[test]
    fn test_out_of_window_port_encodes_to_nothing() {
        let windows = AddressingWindows {
            digital: PortWindow {
                start: 10,
                count: Some(10),
                offset: 20,
            },
            ..AddressingWindows::open()
        };

        let cmd = Command::SetPinOutput {
            port: "d25".parse().unwrap(),
            value: 1,
        };
        assert!(cmd.encode(&windows).is_empty());

        let cmd = Command::SetPinMode {
            port: "d9".parse().unwrap(),
            mode: PinMode::Output,
        };
        assert!(cmd.encode(&windows).is_empty());
    }

    #[test]
    fn test_virtual_pin_mode_carries_setup_payload() {
        let cmd = Command::SetVirtualPinMode {
            port: "v2".parse().unwrap(),
            setup: vec![0x01, 0x00],
        };
        let encoded = cmd.encode(&AddressingWindows::open());
        assert_eq!(encoded, vec![CMD_SET_VIRTUAL_PIN_MODE, 3, 2, 0x01, 0x00]);
    }

    #[test]
    fn test_register_pin_listener_interval() {
        let cmd = Command::RegisterPinListener {
            port: "a3".parse().unwrap(),
            interval_ms: 500,
        };
        let encoded = cmd.encode(&AddressingWindows::open());
        assert_eq!(
            encoded,
            vec![CMD_REGISTER_PIN_LISTENER, 4, 1, 3, 0x01, 0xF4]
        );
    }
}
