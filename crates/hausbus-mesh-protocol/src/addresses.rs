//! Radio addressing types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 16-bit network ("short") address assigned to a radio on the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShortAddress(pub u16);

impl ShortAddress {
    /// The broadcast address.
    pub const BROADCAST: ShortAddress = ShortAddress(0xFFFF);
}

impl fmt::Display for ShortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// A radio's fixed 64-bit hardware address, burned in at manufacture.
///
/// Configuration identifies boards by hardware address; short addresses are
/// learned from inbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareAddress(pub [u8; 8]);

impl HardwareAddress {
    /// The address bytes, most significant first.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
