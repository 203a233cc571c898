//! Hausbus Board Serial Protocol
//!
//! This crate provides types and utilities for talking to hausbus
//! microcontroller boards over their binary serial protocol. The protocol is
//! stream-oriented: after a sync handshake, messages are framed as a type
//! byte, a length byte, and a payload.
//!
//! # Protocol Overview
//!
//! A board and the middleware align their streams with a two-step handshake
//! built on fixed sync markers:
//!
//! - The middleware probes with the **half-sync** marker until the board
//!   echoes recognition.
//! - Once the board has echoed, the middleware switches to the **full-sync**
//!   marker; seeing the full marker from the board means both sides are
//!   aligned and initialization can run.
//!
//! After sync, traffic is framed messages in both directions:
//!
//! - **Commands** (middleware → board): start with a `CMD_*` byte.
//! - **Reports** (board → middleware): start with a `REPORT_*` byte.
//!
//! Ports are addressed symbolically (`d37`, `a3`, `v0`) and resolved to wire
//! pin numbers through an [`AddressingWindows`] passed explicitly to every
//! encode and decode call, which is how one encoder serves many
//! independently-addressed boards behind a mesh tunnel.
//!
//! # Example
//!
//! ```rust,ignore
//! use hausbus_board_protocol::{AddressingWindows, Command, PinMode};
//!
//! let windows = AddressingWindows::open();
//! let cmd = Command::SetPinOutput { port: "d12".parse()?, value: 255 };
//! let frame = cmd.encode(&windows);
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod ports;
mod reports;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use ports::*;
pub use reports::*;
