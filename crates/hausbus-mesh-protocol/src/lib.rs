//! Hausbus Mesh Radio API Protocol
//!
//! This crate provides the framed "API mode" protocol spoken by the wireless
//! mesh radio that carries board-protocol traffic to remotely-addressed
//! boards. It covers the byte-level envelope (delimiter, escaping, checksum),
//! the API message types exchanged with the local radio, and the outbound
//! transaction bookkeeping (rotating frame ids, bounded retries, deferred
//! FIFO).
//!
//! # Frame Format
//!
//! ```text
//! +------+--------+--------+----------------+----------+
//! | 0x7E | len_hi | len_lo | body[0..len]   | checksum |
//! +------+--------+--------+----------------+----------+
//! ```
//!
//! Every byte after the delimiter that collides with the radio's illegal set
//! (`0x7E`, `0x7D`, `0x11`, `0x13`) is escaped as `0x7D, byte ^ 0x20`. The
//! checksum is `0xFF - (sum(body) % 256)`.
//!
//! The tunnel engine that owns the shared radio endpoint lives in
//! `hausbus-io`; everything here is pure and deterministic.

mod addresses;
mod api;
mod constants;
mod error;
mod frame;
mod transaction;

pub use addresses::*;
pub use api::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use transaction::*;
