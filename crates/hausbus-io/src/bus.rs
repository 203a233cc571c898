//! The top-level bus facade.

use std::time::Duration;

use hausbus_board_protocol::PortName;

use crate::board_link::{BoardLink, PortDef};
use crate::config::{BoardMetadata, LinkTimings, MeshConfig};
use crate::endpoint::{RateLimiter, Transport};
use crate::scheduler::{EndpointId, Scheduler, TickReport};
use crate::time::BusTime;

/// All attached hardware links behind one polling surface.
///
/// The application attaches transports, then calls [`poll`](Bus::poll) in a
/// loop; readings come back in the tick reports, writes go in through
/// [`set_port_value`](Bus::set_port_value).
#[derive(Default)]
pub struct Bus {
    scheduler: Scheduler,
}

impl Bus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Bus::default()
    }

    /// Number of attached links.
    pub fn link_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Attach a directly wired board.
    pub fn attach_board(
        &mut self,
        transport: Box<dyn Transport>,
        ports: Vec<PortDef>,
        timings: LinkTimings,
        now: BusTime,
    ) -> EndpointId {
        let link = BoardLink::new(ports, timings);
        self.scheduler.register(transport, None, Box::new(link), now)
    }

    /// Attach a mesh radio serving the boards in `roster`.
    ///
    /// The radio is configured synchronously before the endpoint joins the
    /// tick loop; a failed bring-up still attaches the endpoint (so its
    /// fate shows up in tick reports) but the tunnel discards all traffic.
    pub fn attach_mesh(
        &mut self,
        mut transport: Box<dyn Transport>,
        ports: Vec<PortDef>,
        roster: Vec<BoardMetadata>,
        config: MeshConfig,
        timings: LinkTimings,
        now: BusTime,
    ) -> EndpointId {
        let limiter = config
            .rate_limit
            .map(|rl| RateLimiter::new(rl.max_bytes, rl.window_s));
        let mut tunnel = crate::mesh_tunnel::MeshTunnel::new(ports, roster, config, timings);
        tunnel.bring_up(transport.as_mut());
        self.scheduler
            .register(transport, limiter, Box::new(tunnel), now)
    }

    /// Detach a link, discarding anything still queued for it.
    pub fn detach(&mut self, id: EndpointId) -> bool {
        self.scheduler.deregister(id)
    }

    /// Set a port value. The write is broadcast to every link; only the link
    /// whose board owns the port actually sends a command.
    pub fn set_port_value(&mut self, port: &PortName, value: u16, now: BusTime) {
        self.scheduler.set_port_value(port, value, now);
    }

    /// Run one scheduler tick. `timeout` bounds the idle sleep taken when no
    /// bytes move.
    pub fn poll(&mut self, now: BusTime, timeout: Duration) -> TickReport {
        self.scheduler.tick(now, timeout)
    }
}
