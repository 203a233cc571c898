//! Cooperative I/O runtime for hausbus hardware links.
//!
//! A single-threaded [`Scheduler`] sweeps every attached endpoint with
//! non-blocking reads and writes; protocol engines ([`BoardLink`] for wired
//! boards, [`MeshTunnel`] for boards behind a mesh radio) run as callbacks
//! and never block the loop. The [`Bus`] facade ties it together for
//! applications.
//!
//! Time is explicit: the caller passes [`BusTime`] into every poll, which
//! keeps all deadline behavior deterministic under test.

pub mod board_link;
pub mod bus;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod scheduler;
pub mod testing;
pub mod time;
pub mod transports;

mod mesh_tunnel;

pub use board_link::{BoardLink, PortDef, PortKind};
pub use bus::Bus;
pub use config::{BoardMetadata, LinkTimings, MeshConfig, RateLimitConfig};
pub use endpoint::{Outbox, RateLimiter, Transport};
pub use error::LinkFault;
pub use mesh_tunnel::MeshTunnel;
pub use scheduler::{
    EndpointId, LinkCtx, LinkHandler, LinkSource, PortEvent, Scheduler, TickReport,
};
pub use time::BusTime;
pub use transports::{SerialTransport, TcpTransport};
