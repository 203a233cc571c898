//! The cooperative tick loop.
//!
//! One [`Scheduler`] owns every attached endpoint. Each [`tick`](Scheduler::tick)
//! sweeps all endpoints through three phases: write (drain outboxes under
//! their rate limits), read (one non-blocking read per endpoint, handed to
//! the endpoint's handler), and timers (the handler's periodic work). A
//! faulting endpoint is removed at the end of its phase and reported in the
//! tick result; the sweep never blocks on any single endpoint.
//!
//! When a whole tick moves no bytes the scheduler sleeps for the caller's
//! timeout before returning, so an idle bus does not spin.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::thread;
use std::time::Duration;

use hausbus_board_protocol::PortName;
use hausbus_mesh_protocol::ShortAddress;

use crate::endpoint::{Endpoint, Outbox, RateLimiter, Transport};
use crate::error::LinkFault;
use crate::time::BusTime;

/// Scratch buffer size for the read phase.
const READ_CHUNK: usize = 4096;

/// Opaque handle to a registered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
impl EndpointId {
    /// Fabricate an id for handler tests that drive a [`LinkCtx`] directly.
    pub(crate) fn fake(id: u64) -> EndpointId {
        EndpointId(id)
    }
}

/// Where a port event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    /// A board wired directly to an endpoint.
    Direct(EndpointId),
    /// A board reached through a mesh tunnel endpoint.
    Mesh {
        /// The tunnel's endpoint.
        endpoint: EndpointId,
        /// The remote board's short address.
        address: ShortAddress,
    },
}

impl LinkSource {
    /// The endpoint this source is attached through.
    pub fn endpoint(&self) -> EndpointId {
        match self {
            LinkSource::Direct(id) => *id,
            LinkSource::Mesh { endpoint, .. } => *endpoint,
        }
    }
}

/// A port reading surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEvent {
    /// Which link reported the reading.
    pub source: LinkSource,
    /// Symbolic port, in the global index space.
    pub port: PortName,
    /// The reported value.
    pub value: u16,
}

/// What a handler sees during a callback.
pub struct LinkCtx<'a> {
    /// Current bus time.
    pub now: BusTime,
    /// The link the callback runs for.
    pub source: LinkSource,
    /// The endpoint's outbound queue.
    pub out: &'a mut Outbox,
    /// Event sink for the current tick.
    pub events: &'a mut Vec<PortEvent>,
}

impl LinkCtx<'_> {
    /// Queue bytes for the endpoint.
    pub fn send(&mut self, bytes: &[u8]) {
        self.out.push(bytes);
    }

    /// Surface a port reading.
    pub fn report(&mut self, port: PortName, value: u16) {
        self.events.push(PortEvent {
            source: self.source,
            port,
            value,
        });
    }

    /// The endpoint this context runs for.
    pub fn endpoint_id(&self) -> EndpointId {
        self.source.endpoint()
    }
}

/// Protocol logic bound to one endpoint.
///
/// Handlers are single-threaded and callback-driven; they own their parse
/// state and express all output through the [`LinkCtx`]. Returning an error
/// from any fallible callback tears the endpoint down.
pub trait LinkHandler {
    /// Called once when the endpoint is registered.
    fn on_attach(&mut self, ctx: &mut LinkCtx<'_>);

    /// Called with freshly read bytes.
    fn on_data(&mut self, ctx: &mut LinkCtx<'_>, data: &[u8]) -> Result<(), LinkFault>;

    /// Called every tick for periodic work (probes, deadlines).
    fn on_tick(&mut self, ctx: &mut LinkCtx<'_>) -> Result<(), LinkFault>;

    /// Called when the application sets a port value. The handler queues a
    /// command only if the port belongs to its board.
    fn set_port(&mut self, ctx: &mut LinkCtx<'_>, port: &PortName, value: u16);
}

struct Entry {
    endpoint: Endpoint,
    handler: Box<dyn LinkHandler>,
}

/// The result of one tick.
#[derive(Default)]
pub struct TickReport {
    /// Port readings surfaced this tick.
    pub events: Vec<PortEvent>,
    /// Endpoints torn down this tick, with the fault that killed them.
    pub dropped: Vec<(EndpointId, LinkFault)>,
}

/// The cooperative scheduler driving every attached endpoint.
#[derive(Default)]
pub struct Scheduler {
    entries: HashMap<u64, Entry>,
    next_id: u64,
    /// Events produced outside a tick (attach, set_port), delivered with the
    /// next tick's report.
    pending_events: Vec<PortEvent>,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Scheduler::default()
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no endpoints are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: EndpointId) -> bool {
        self.entries.contains_key(&id.0)
    }

    /// Register an endpoint and hand it to `handler`.
    ///
    /// The handler's `on_attach` runs immediately; anything it queues goes
    /// out with the next tick's write phase.
    pub fn register(
        &mut self,
        transport: Box<dyn Transport>,
        limiter: Option<RateLimiter>,
        mut handler: Box<dyn LinkHandler>,
        now: BusTime,
    ) -> EndpointId {
        let id = self.next_id;
        self.next_id += 1;

        let mut endpoint = Endpoint::new(transport, limiter);
        let mut ctx = LinkCtx {
            now,
            source: LinkSource::Direct(EndpointId(id)),
            out: &mut endpoint.outbox,
            events: &mut self.pending_events,
        };
        handler.on_attach(&mut ctx);

        self.entries.insert(id, Entry { endpoint, handler });
        log::info!("endpoint {id} registered");
        EndpointId(id)
    }

    /// Remove an endpoint. Queued output is discarded.
    pub fn deregister(&mut self, id: EndpointId) -> bool {
        let removed = self.entries.remove(&id.0).is_some();
        if removed {
            log::info!("endpoint {id} deregistered");
        }
        removed
    }

    /// Broadcast a port write to every handler.
    ///
    /// Each handler decides for itself whether the port belongs to its board;
    /// handlers whose addressing windows reject the port queue nothing.
    pub fn set_port_value(&mut self, port: &PortName, value: u16, now: BusTime) {
        for (&id, entry) in self.entries.iter_mut() {
            let Entry { endpoint, handler } = entry;
            let mut ctx = LinkCtx {
                now,
                source: LinkSource::Direct(EndpointId(id)),
                out: &mut endpoint.outbox,
                events: &mut self.pending_events,
            };
            handler.set_port(&mut ctx, port, value);
        }
    }

    /// Run one tick: write phase, read phase, timer phase.
    ///
    /// `timeout` bounds the idle sleep taken when the tick moves no bytes in
    /// either direction; pass zero to never sleep. Event ordering between
    /// endpoints is unspecified.
    pub fn tick(&mut self, now: BusTime, timeout: Duration) -> TickReport {
        let mut events = mem::take(&mut self.pending_events);
        let mut dropped = Vec::new();
        let mut moved = 0usize;

        // Write phase.
        let mut dead = Vec::new();
        for (&id, entry) in self.entries.iter_mut() {
            match entry.endpoint.flush(now) {
                Ok(n) => moved += n,
                Err(fault) => dead.push((id, fault)),
            }
        }
        self.teardown(dead, &mut dropped);

        // Read phase: one non-blocking read per endpoint.
        let mut dead = Vec::new();
        let mut scratch = [0u8; READ_CHUNK];
        for (&id, entry) in self.entries.iter_mut() {
            let Entry { endpoint, handler } = entry;
            match endpoint.transport.try_read(&mut scratch) {
                Ok(0) => {}
                Ok(n) => {
                    moved += n;
                    let mut ctx = LinkCtx {
                        now,
                        source: LinkSource::Direct(EndpointId(id)),
                        out: &mut endpoint.outbox,
                        events: &mut events,
                    };
                    if let Err(fault) = handler.on_data(&mut ctx, &scratch[..n]) {
                        dead.push((id, fault));
                    }
                }
                Err(err) => dead.push((id, LinkFault::Transport(err))),
            }
        }
        self.teardown(dead, &mut dropped);

        // Timer phase.
        let mut dead = Vec::new();
        for (&id, entry) in self.entries.iter_mut() {
            let Entry { endpoint, handler } = entry;
            let mut ctx = LinkCtx {
                now,
                source: LinkSource::Direct(EndpointId(id)),
                out: &mut endpoint.outbox,
                events: &mut events,
            };
            if let Err(fault) = handler.on_tick(&mut ctx) {
                dead.push((id, fault));
            }
        }
        self.teardown(dead, &mut dropped);

        // Nothing moved: yield instead of spinning.
        if moved == 0 && !timeout.is_zero() {
            thread::sleep(timeout);
        }

        TickReport { events, dropped }
    }

    fn teardown(&mut self, dead: Vec<(u64, LinkFault)>, dropped: &mut Vec<(EndpointId, LinkFault)>) {
        for (id, fault) in dead {
            if self.entries.remove(&id).is_some() {
                log::warn!("endpoint {id} torn down: {fault}");
                dropped.push((EndpointId(id), fault));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    use hausbus_board_protocol::{PortClass, PortName};

    use super::*;
    use crate::testing::pipe;

    /// A handler that records its callbacks and echoes data back.
    struct EchoHandler {
        calls: Rc<RefCell<Vec<String>>>,
        fail_on_data: bool,
    }

    impl LinkHandler for EchoHandler {
        fn on_attach(&mut self, ctx: &mut LinkCtx<'_>) {
            self.calls.borrow_mut().push("attach".into());
            ctx.send(b"hello");
        }

        fn on_data(&mut self, ctx: &mut LinkCtx<'_>, data: &[u8]) -> Result<(), LinkFault> {
            self.calls.borrow_mut().push(format!("data:{}", data.len()));
            if self.fail_on_data {
                return Err(LinkFault::ReceiveTimeout { timeout_s: 0.0 });
            }
            ctx.send(data);
            ctx.report(PortName::new(PortClass::Digital, 1), 1);
            Ok(())
        }

        fn on_tick(&mut self, _ctx: &mut LinkCtx<'_>) -> Result<(), LinkFault> {
            self.calls.borrow_mut().push("tick".into());
            Ok(())
        }

        fn set_port(&mut self, ctx: &mut LinkCtx<'_>, port: &PortName, value: u16) {
            self.calls.borrow_mut().push(format!("set:{port}={value}"));
            ctx.send(&[0xF0]);
        }
    }

    fn echo(calls: &Rc<RefCell<Vec<String>>>) -> Box<EchoHandler> {
        Box::new(EchoHandler {
            calls: Rc::clone(calls),
            fail_on_data: false,
        })
    }

    #[test]
    fn test_attach_output_goes_out_on_first_tick() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (ours, mut theirs) = pipe();
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(ours), None, echo(&calls), BusTime::ZERO);

        scheduler.tick(BusTime::ZERO, Duration::ZERO);
        assert_eq!(theirs.drain(), b"hello".to_vec());
        assert_eq!(calls.borrow().as_slice(), &["attach", "tick"]);
    }

    #[test]
    fn test_read_dispatches_to_handler_and_surfaces_events() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (ours, mut theirs) = pipe();
        let mut scheduler = Scheduler::new();
        let id = scheduler.register(Box::new(ours), None, echo(&calls), BusTime::ZERO);

        theirs.try_write(&[1, 2, 3]).unwrap();
        let report = scheduler.tick(BusTime::ZERO, Duration::ZERO);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].source, LinkSource::Direct(id));
        assert_eq!(report.events[0].value, 1);

        // The echo queued in on_data leaves on the next write phase.
        scheduler.tick(BusTime::ZERO, Duration::ZERO);
        let wire = theirs.drain();
        assert!(wire.ends_with(&[1, 2, 3]));
    }

    #[test]
    fn test_transport_error_tears_endpoint_down() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (ours, theirs) = pipe();
        let mut scheduler = Scheduler::new();
        let id = scheduler.register(Box::new(ours), None, echo(&calls), BusTime::ZERO);
        scheduler.tick(BusTime::ZERO, Duration::ZERO);

        theirs.close();
        let report = scheduler.tick(BusTime::ZERO, Duration::ZERO);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].0, id);
        assert!(matches!(report.dropped[0].1, LinkFault::Transport(_)));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_handler_fault_tears_endpoint_down() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (ours, mut theirs) = pipe();
        let mut scheduler = Scheduler::new();
        let id = scheduler.register(
            Box::new(ours),
            None,
            Box::new(EchoHandler {
                calls: Rc::clone(&calls),
                fail_on_data: true,
            }),
            BusTime::ZERO,
        );

        theirs.try_write(&[0xFF]).unwrap();
        let report = scheduler.tick(BusTime::ZERO, Duration::ZERO);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].0, id);
        assert!(!scheduler.contains(id));
    }

    #[test]
    fn test_one_slow_endpoint_does_not_stall_others() {
        // One endpoint's peer sends nothing; the other keeps flowing.
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (idle_ours, _idle_theirs) = pipe();
        let (busy_ours, mut busy_theirs) = pipe();
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(idle_ours), None, echo(&calls), BusTime::ZERO);
        let busy = scheduler.register(Box::new(busy_ours), None, echo(&calls), BusTime::ZERO);

        busy_theirs.try_write(&[9, 9]).unwrap();
        let report = scheduler.tick(BusTime::ZERO, Duration::ZERO);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].source, LinkSource::Direct(busy));
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn test_set_port_value_broadcasts() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (a_ours, _a) = pipe();
        let (b_ours, _b) = pipe();
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(a_ours), None, echo(&calls), BusTime::ZERO);
        scheduler.register(Box::new(b_ours), None, echo(&calls), BusTime::ZERO);

        scheduler.set_port_value(&"d7".parse().unwrap(), 1, BusTime::ZERO);
        let sets = calls
            .borrow()
            .iter()
            .filter(|c| c.as_str() == "set:d7=1")
            .count();
        assert_eq!(sets, 2);
    }

    #[test]
    fn test_deregister_discards_endpoint() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (ours, _theirs) = pipe();
        let mut scheduler = Scheduler::new();
        let id = scheduler.register(Box::new(ours), None, echo(&calls), BusTime::ZERO);

        assert!(scheduler.deregister(id));
        assert!(!scheduler.deregister(id));
        assert!(scheduler.is_empty());
    }

    /// A transport whose writes are accepted nowhere.
    struct StuckTransport;

    impl Transport for StuckTransport {
        fn try_read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
        fn try_write(&mut self, _data: &[u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_zero_byte_write_is_a_fault() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        let id = scheduler.register(Box::new(StuckTransport), None, echo(&calls), BusTime::ZERO);

        // "hello" is queued; the stuck transport takes none of it.
        let report = scheduler.tick(BusTime::ZERO, Duration::ZERO);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].0, id);
        assert!(matches!(
            report.dropped[0].1,
            LinkFault::WriteStalled { pending: 5 }
        ));
    }
}
