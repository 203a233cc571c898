//! Link and mesh configuration.

use hausbus_board_protocol::{AddressingWindows, PortWindow};
use hausbus_mesh_protocol::HardwareAddress;
use serde::{Deserialize, Serialize};

/// Timing knobs shared by every board link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkTimings {
    /// Base interval between sync probes, in seconds. While unsynced the
    /// interval doubles after every probe, up to the cap.
    pub probe_period_s: f64,
    /// Upper bound on the backed-off probe interval.
    pub probe_backoff_cap_s: f64,
    /// Keepalive probe interval once fully synced.
    pub keepalive_period_s: f64,
    /// Silence longer than this tears the link down.
    pub receive_timeout_s: f64,
}

impl Default for LinkTimings {
    fn default() -> Self {
        LinkTimings {
            probe_period_s: 1.0,
            probe_backoff_cap_s: 8.0,
            keepalive_period_s: 10.0,
            receive_timeout_s: 13.0,
        }
    }
}

/// A byte budget applied to an endpoint's writes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bytes allowed per window.
    pub max_bytes: usize,
    /// Window length in seconds.
    pub window_s: f64,
}

/// Configuration for a mesh tunnel endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// The mesh network id programmed into the local radio.
    pub network_id: u16,
    /// Retransmits granted to each message before it is dropped.
    pub tx_retries: u8,
    /// How many times bring-up polls for command acknowledgements.
    pub bringup_poll_attempts: u32,
    /// Pause between bring-up polls, in seconds.
    pub bringup_poll_interval_s: f64,
    /// Guard silence required around the command-mode escape sequence.
    pub command_mode_guard_s: f64,
    /// Optional write budget for slow radios.
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            network_id: 0x3332,
            tx_retries: 3,
            bringup_poll_attempts: 20,
            bringup_poll_interval_s: 0.1,
            command_mode_guard_s: 1.0,
            rate_limit: None,
        }
    }
}

/// Static description of one board reachable over the mesh.
///
/// Boards are identified by their radio's hardware address; the short address
/// they answer from is learned from traffic. Each board owns a contiguous
/// slice of the global port index space per class, which its link sees as
/// local 0-based pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardMetadata {
    /// The board radio's fixed hardware address.
    pub hardware_address: HardwareAddress,
    /// First global digital index owned by the board.
    pub digital_start: u16,
    /// Number of digital ports owned.
    pub digital_count: u16,
    /// First global analog index owned by the board.
    pub analog_start: u16,
    /// Number of analog ports owned.
    pub analog_count: u16,
    /// First global virtual index owned by the board.
    pub virtual_start: u16,
    /// Number of virtual ports owned.
    pub virtual_count: u16,
}

impl BoardMetadata {
    /// The addressing windows mapping the board's slice to local pins.
    pub fn windows(&self) -> AddressingWindows {
        fn window(start: u16, count: u16) -> PortWindow {
            PortWindow {
                start,
                count: Some(count),
                offset: -(start as i16),
            }
        }
        AddressingWindows {
            digital: window(self.digital_start, self.digital_count),
            analog: window(self.analog_start, self.analog_count),
            virtual_ports: window(self.virtual_start, self.virtual_count),
        }
    }
}
