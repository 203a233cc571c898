//! Port naming and pin addressing.
//!
//! Ports are addressed symbolically as `<class-letter><index>`: `d37` is
//! digital pin 37, `a3` analog pin 3, `v0` virtual pin 0. A symbolic index is
//! turned into an on-the-wire pin number through a [`PortWindow`]: boards
//! behind a mesh tunnel each own a slice of the global index space and see
//! their slice as local 0-based pins.
//!
//! Windows are passed explicitly to every encode/decode call. Resolving a
//! port outside the window yields `None`, which encoders turn into an empty
//! byte sequence; that silent suppression is what lets `set_port_value` be
//! broadcast to every attached link.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// The three classes of board ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortClass {
    /// Digital pins (`d`), values 0/1 or PWM 0-255.
    Digital,
    /// Analog pins (`a`), values 0-1023.
    Analog,
    /// Virtual pins (`v`), software-emulated on-board devices.
    Virtual,
}

impl PortClass {
    /// The class letter used in symbolic port names.
    pub fn letter(&self) -> char {
        match self {
            PortClass::Digital => 'd',
            PortClass::Analog => 'a',
            PortClass::Virtual => 'v',
        }
    }

    /// The class code used on the wire.
    pub fn code(&self) -> u8 {
        match self {
            PortClass::Digital => 0,
            PortClass::Analog => 1,
            PortClass::Virtual => 2,
        }
    }

    /// Look up a class from its wire code.
    pub fn from_code(code: u8) -> Option<PortClass> {
        match code {
            0 => Some(PortClass::Digital),
            1 => Some(PortClass::Analog),
            2 => Some(PortClass::Virtual),
            _ => None,
        }
    }
}

/// A symbolic port name such as `d37`, `a3`, or `v0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortName {
    /// Port class.
    pub class: PortClass,
    /// Symbolic index within the class.
    pub index: u16,
}

impl PortName {
    /// Create a port name from class and index.
    pub fn new(class: PortClass, index: u16) -> Self {
        PortName { class, index }
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.letter(), self.index)
    }
}

impl FromStr for PortName {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ProtocolError::BadPortName(s.to_string());
        let mut chars = s.chars();
        let class = match chars.next().ok_or_else(bad)? {
            'd' => PortClass::Digital,
            'a' => PortClass::Analog,
            'v' => PortClass::Virtual,
            _ => return Err(bad()),
        };
        let index = chars.as_str().parse::<u16>().map_err(|_| bad())?;
        Ok(PortName { class, index })
    }
}

/// The valid symbolic range and wire offset for one port class.
///
/// A symbolic index is accepted when it falls inside `[start, start + count)`
/// (or always, when `count` is `None`), and maps to wire pin
/// `index + offset`. The wire pin must fit in a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortWindow {
    /// First symbolic index the window accepts.
    pub start: u16,
    /// Number of accepted indices, or `None` for an unrestricted window.
    pub count: Option<u16>,
    /// Signed offset added to the symbolic index to get the wire pin.
    pub offset: i16,
}

impl PortWindow {
    /// An unrestricted window with no offset (direct-attached boards).
    pub const fn open() -> Self {
        PortWindow {
            start: 0,
            count: None,
            offset: 0,
        }
    }

    /// Resolve a symbolic index to a wire pin, or `None` if the index falls
    /// outside the window or the wire pin would not fit in a byte.
    pub fn resolve(&self, index: u16) -> Option<u8> {
        if let Some(count) = self.count {
            if index < self.start || index >= self.start.checked_add(count)? {
                return None;
            }
        }
        let wire = i32::from(index) + i32::from(self.offset);
        u8::try_from(wire).ok()
    }

    /// Map a wire pin back to its symbolic index, or `None` if the resulting
    /// index falls outside the window.
    pub fn symbolic(&self, wire: u8) -> Option<u16> {
        let index = i32::from(wire) - i32::from(self.offset);
        let index = u16::try_from(index).ok()?;
        if let Some(count) = self.count {
            if index < self.start || index >= self.start.checked_add(count)? {
                return None;
            }
        }
        Some(index)
    }
}

impl Default for PortWindow {
    fn default() -> Self {
        PortWindow::open()
    }
}

/// Per-class addressing windows for one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressingWindows {
    /// Window for digital ports.
    pub digital: PortWindow,
    /// Window for analog ports.
    pub analog: PortWindow,
    /// Window for virtual ports.
    pub virtual_ports: PortWindow,
}

impl AddressingWindows {
    /// Unrestricted windows for all classes (direct-attached boards).
    pub const fn open() -> Self {
        AddressingWindows {
            digital: PortWindow::open(),
            analog: PortWindow::open(),
            virtual_ports: PortWindow::open(),
        }
    }

    /// The window for a given port class.
    pub fn window(&self, class: PortClass) -> &PortWindow {
        match class {
            PortClass::Digital => &self.digital,
            PortClass::Analog => &self.analog,
            PortClass::Virtual => &self.virtual_ports,
        }
    }

    /// Resolve a symbolic port to its wire pin.
    pub fn resolve(&self, port: &PortName) -> Option<u8> {
        self.window(port.class).resolve(port.index)
    }

    /// Map a wire pin back to a symbolic port of the given class.
    pub fn symbolic(&self, class: PortClass, wire: u8) -> Option<PortName> {
        let index = self.window(class).symbolic(wire)?;
        Some(PortName { class, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_name_parse_and_display() {
        let port: PortName = "d37".parse().unwrap();
        assert_eq!(port, PortName::new(PortClass::Digital, 37));
        assert_eq!(port.to_string(), "d37");

        let port: PortName = "a3".parse().unwrap();
        assert_eq!(port.class, PortClass::Analog);
        assert_eq!(port.index, 3);

        let port: PortName = "v0".parse().unwrap();
        assert_eq!(port.class, PortClass::Virtual);
        assert_eq!(port.index, 0);
    }

    #[test]
    fn test_port_name_rejects_garbage() {
        assert!("".parse::<PortName>().is_err());
        assert!("x7".parse::<PortName>().is_err());
        assert!("d".parse::<PortName>().is_err());
        assert!("d-1".parse::<PortName>().is_err());
        assert!("d3x".parse::<PortName>().is_err());
    }

    #[test]
    fn test_open_window_is_identity() {
        let w = PortWindow::open();
        assert_eq!(w.resolve(0), Some(0));
        assert_eq!(w.resolve(255), Some(255));
        assert_eq!(w.resolve(256), None); // does not fit in a byte
        assert_eq!(w.symbolic(42), Some(42));
    }

    #[test]
    fn test_window_offset_and_range() {
        // A board owning d10..d19 shifted by +20 on the wire.
        let w = PortWindow {
            start: 10,
            count: Some(10),
            offset: 20,
        };
        assert_eq!(w.resolve(12), Some(32));
        assert_eq!(w.resolve(19), Some(39));
        assert_eq!(w.resolve(9), None); // below the window
        assert_eq!(w.resolve(20), None); // above the window
    }

    #[test]
    fn test_window_symbolic_inverts_resolve() {
        let w = PortWindow {
            start: 20,
            count: Some(10),
            offset: -20,
        };
        for index in 20..30 {
            let wire = w.resolve(index).unwrap();
            assert_eq!(w.symbolic(wire), Some(index));
        }
        // Wire pin 15 would map to index 35, outside the window.
        assert_eq!(w.symbolic(15), None);
    }

    #[test]
    fn test_addressing_windows_dispatch_by_class() {
        let windows = AddressingWindows {
            digital: PortWindow {
                start: 10,
                count: Some(10),
                offset: -10,
            },
            analog: PortWindow::open(),
            virtual_ports: PortWindow {
                start: 0,
                count: Some(0),
                offset: 0,
            },
        };
        assert_eq!(windows.resolve(&"d15".parse().unwrap()), Some(5));
        assert_eq!(windows.resolve(&"a15".parse().unwrap()), Some(15));
        // A zero-count window accepts nothing.
        assert_eq!(windows.resolve(&"v0".parse().unwrap()), None);
        assert_eq!(
            windows.symbolic(PortClass::Digital, 5),
            Some("d15".parse().unwrap())
        );
    }
}
