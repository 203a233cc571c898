//! The mesh tunnel: one radio endpoint multiplexing many remote boards.
//!
//! The local radio is configured synchronously at attach time (command mode,
//! network id, exit). After that everything is event-driven: received packets
//! identify their board by hardware address, and the first packet from a
//! configured board lazily creates a [`BoardLink`] for it, windowed to the
//! board's slice of the port index space. Bytes that link queues are wrapped
//! in transmit requests; delivery is tracked per frame id by a
//! [`TransactionLedger`], with bounded retransmits.
//!
//! Traffic from a hardware address not in the roster is logged and dropped.
//! A remote link fault removes only that board and purges its transactions;
//! the tunnel itself stays up.

use std::collections::HashMap;
use std::io;
use std::thread;
use std::time::Duration;

use hausbus_board_protocol::PortName;
use hausbus_mesh_protocol::{
    ApiEvent, ApiFrameCodec, HardwareAddress, ShortAddress, TransactionLedger, TxOutcome,
    TX_STATUS_OK,
};

use crate::board_link::{BoardLink, PortDef};
use crate::config::{BoardMetadata, LinkTimings, MeshConfig};
use crate::endpoint::{Outbox, Transport};
use crate::error::LinkFault;
use crate::scheduler::{LinkCtx, LinkHandler, LinkSource};

/// One remote board reached through the tunnel.
struct RemoteBoardLink {
    hardware: HardwareAddress,
    link: BoardLink,
    /// Virtual outbox; its contents become transmit-request payloads.
    outbox: Outbox,
}

/// Protocol engine for a mesh radio endpoint.
pub struct MeshTunnel {
    codec: ApiFrameCodec,
    ledger: TransactionLedger,
    remotes: HashMap<ShortAddress, RemoteBoardLink>,
    /// Boards allowed on this tunnel, identified by hardware address.
    roster: Vec<BoardMetadata>,
    /// Global port configuration; each remote link keeps its own slice.
    ports: Vec<PortDef>,
    config: MeshConfig,
    timings: LinkTimings,
    /// Set once bring-up succeeds; until then all traffic is discarded.
    ready: bool,
}

impl MeshTunnel {
    /// Create a tunnel for the boards in `roster`.
    pub fn new(
        ports: Vec<PortDef>,
        roster: Vec<BoardMetadata>,
        config: MeshConfig,
        timings: LinkTimings,
    ) -> Self {
        let retries = config.tx_retries;
        MeshTunnel {
            codec: ApiFrameCodec::new(),
            ledger: TransactionLedger::new(retries),
            remotes: HashMap::new(),
            roster,
            ports,
            config,
            timings,
            ready: false,
        }
    }

    /// Whether bring-up succeeded.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of remote boards with a live link.
    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Number of transmit requests awaiting a status reply.
    pub fn transactions_in_flight(&self) -> usize {
        self.ledger.in_flight_len()
    }

    /// Configure the local radio over `transport`, blocking until it has
    /// acknowledged every command or the poll budget runs out.
    ///
    /// This is the one place the crate blocks: it runs once per attach,
    /// before the endpoint joins the tick loop.
    pub fn bring_up(&mut self, transport: &mut dyn Transport) -> bool {
        let commands = [
            "ATCE1\r".to_string(),
            format!("ATID{:04X}\r", self.config.network_id),
            "ATNJFF\r".to_string(),
            "ATEE0\r".to_string(),
            "ATCN\r".to_string(),
        ];

        let sent = (|| -> io::Result<()> {
            write_all(transport, b"+++")?;
            // The radio requires silence around the escape sequence.
            sleep_secs(self.config.command_mode_guard_s);
            for command in &commands {
                write_all(transport, command.as_bytes())?;
            }
            Ok(())
        })();
        if let Err(err) = sent {
            log::warn!("mesh bring-up failed: {err}");
            self.ready = false;
            return false;
        }

        // One OK for the escape sequence, one per command.
        let expected = 1 + commands.len();
        let mut acks = 0;
        let mut buf = [0u8; 256];
        for _ in 0..self.config.bringup_poll_attempts {
            match transport.try_read(&mut buf) {
                Ok(n) => acks += count_ok(&buf[..n]),
                Err(err) => {
                    log::warn!("mesh bring-up read failed: {err}");
                    break;
                }
            }
            if acks >= expected {
                log::info!(
                    "mesh radio configured, network id 0x{:04X}",
                    self.config.network_id
                );
                self.ready = true;
                return true;
            }
            sleep_secs(self.config.bringup_poll_interval_s);
        }

        log::warn!("mesh bring-up saw {acks}/{expected} acknowledgements, tunnel not ready");
        self.ready = false;
        false
    }

    /// Queue `payload` for delivery to `dest`, tracked by the ledger.
    fn transmit(&mut self, ctx: &mut LinkCtx<'_>, dest: ShortAddress, payload: Vec<u8>) {
        if payload.is_empty() {
            return;
        }
        match self.ledger.begin(dest, payload) {
            Some(frame) => ctx.send(&frame),
            None => log::debug!("all frame ids in flight, deferring message to {dest}"),
        }
    }

    /// Remove a remote link and forget its pending traffic.
    fn drop_remote(&mut self, short: ShortAddress, fault: &LinkFault) {
        if let Some(remote) = self.remotes.remove(&short) {
            log::warn!("remote board {} ({short}) detached: {fault}", remote.hardware);
            self.ledger.purge_dest(short);
        }
    }

    /// Make sure a link exists for the board at `short`, creating it on the
    /// board's first packet. Returns false for boards not in the roster.
    fn ensure_remote(
        &mut self,
        ctx: &mut LinkCtx<'_>,
        hardware: HardwareAddress,
        short: ShortAddress,
    ) -> bool {
        if self.remotes.contains_key(&short) {
            return true;
        }
        let Some(meta) = self
            .roster
            .iter()
            .find(|meta| meta.hardware_address == hardware)
        else {
            log::warn!("ignoring traffic from unconfigured board {hardware}");
            return false;
        };

        log::info!("board {hardware} appeared at {short}");
        let mut remote = RemoteBoardLink {
            hardware,
            link: BoardLink::with_windows(self.ports.clone(), self.timings, meta.windows()),
            outbox: Outbox::default(),
        };
        let mut child = LinkCtx {
            now: ctx.now,
            source: LinkSource::Mesh {
                endpoint: ctx.endpoint_id(),
                address: short,
            },
            out: &mut remote.outbox,
            events: &mut *ctx.events,
        };
        remote.link.on_attach(&mut child);
        let probe = remote.outbox.take();
        self.remotes.insert(short, remote);
        self.transmit(ctx, short, probe);
        true
    }

    fn handle_event(&mut self, ctx: &mut LinkCtx<'_>, event: ApiEvent) {
        match event {
            ApiEvent::ModemStatus { status } => {
                log::info!("radio modem status 0x{status:02X}");
            }

            ApiEvent::TxStatus { frame_id, status } => {
                match self.ledger.on_tx_status(frame_id, status == TX_STATUS_OK) {
                    TxOutcome::Delivered { followup } => {
                        if let Some(frame) = followup {
                            ctx.send(&frame);
                        }
                    }
                    TxOutcome::Retransmit(frame) => {
                        log::debug!("retransmitting frame {frame_id} (status 0x{status:02X})");
                        ctx.send(&frame);
                    }
                    TxOutcome::Dropped { dest } => {
                        log::warn!("message to {dest} dropped, retransmit budget exhausted");
                    }
                    TxOutcome::Unknown => {
                        log::debug!("status for unknown frame id {frame_id}");
                    }
                }
            }

            ApiEvent::Rx {
                hardware,
                short,
                payload,
            } => {
                if !self.ensure_remote(ctx, hardware, short) {
                    return;
                }
                let Some(remote) = self.remotes.get_mut(&short) else {
                    return;
                };
                let mut child = LinkCtx {
                    now: ctx.now,
                    source: LinkSource::Mesh {
                        endpoint: ctx.endpoint_id(),
                        address: short,
                    },
                    out: &mut remote.outbox,
                    events: &mut *ctx.events,
                };
                let result = remote.link.on_data(&mut child, &payload);
                let reply = remote.outbox.take();
                match result {
                    Ok(()) => self.transmit(ctx, short, reply),
                    Err(fault) => self.drop_remote(short, &fault),
                }
            }
        }
    }
}

impl LinkHandler for MeshTunnel {
    fn on_attach(&mut self, _ctx: &mut LinkCtx<'_>) {
        log::info!(
            "mesh tunnel attached, {} boards configured, ready={}",
            self.roster.len(),
            self.ready
        );
    }

    fn on_data(&mut self, ctx: &mut LinkCtx<'_>, data: &[u8]) -> Result<(), LinkFault> {
        if !self.ready {
            log::debug!("discarding {} bytes, tunnel not ready", data.len());
            return Ok(());
        }
        self.codec.push(data);
        loop {
            match self.codec.next_frame() {
                Ok(Some(body)) => match ApiEvent::decode(&body) {
                    Ok(event) => self.handle_event(ctx, event),
                    Err(err) => log::warn!("undecodable api frame: {err}"),
                },
                Ok(None) => break,
                Err(err) => log::warn!("mesh frame error: {err}"),
            }
        }
        Ok(())
    }

    fn on_tick(&mut self, ctx: &mut LinkCtx<'_>) -> Result<(), LinkFault> {
        let addresses: Vec<ShortAddress> = self.remotes.keys().copied().collect();
        let mut outbound = Vec::new();
        let mut dead = Vec::new();
        for short in addresses {
            let Some(remote) = self.remotes.get_mut(&short) else {
                continue;
            };
            let mut child = LinkCtx {
                now: ctx.now,
                source: LinkSource::Mesh {
                    endpoint: ctx.endpoint_id(),
                    address: short,
                },
                out: &mut remote.outbox,
                events: &mut *ctx.events,
            };
            let result = remote.link.on_tick(&mut child);
            let bytes = remote.outbox.take();
            match result {
                Ok(()) => {
                    if !bytes.is_empty() {
                        outbound.push((short, bytes));
                    }
                }
                Err(fault) => dead.push((short, fault)),
            }
        }
        // A dead remote takes down only itself, never the tunnel.
        for (short, fault) in dead {
            self.drop_remote(short, &fault);
        }
        for (short, bytes) in outbound {
            self.transmit(ctx, short, bytes);
        }
        Ok(())
    }

    fn set_port(&mut self, ctx: &mut LinkCtx<'_>, port: &PortName, value: u16) {
        if !self.ready {
            return;
        }
        let addresses: Vec<ShortAddress> = self.remotes.keys().copied().collect();
        let mut outbound = Vec::new();
        for short in addresses {
            let Some(remote) = self.remotes.get_mut(&short) else {
                continue;
            };
            let mut child = LinkCtx {
                now: ctx.now,
                source: LinkSource::Mesh {
                    endpoint: ctx.endpoint_id(),
                    address: short,
                },
                out: &mut remote.outbox,
                events: &mut *ctx.events,
            };
            remote.link.set_port(&mut child, port, value);
            let bytes = remote.outbox.take();
            if !bytes.is_empty() {
                outbound.push((short, bytes));
            }
        }
        for (short, bytes) in outbound {
            self.transmit(ctx, short, bytes);
        }
    }
}

fn write_all(transport: &mut dyn Transport, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        let n = transport.try_write(data)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "radio not accepting data",
            ));
        }
        data = &data[n..];
    }
    Ok(())
}

fn sleep_secs(secs: f64) {
    if secs > 0.0 {
        thread::sleep(Duration::from_secs_f64(secs));
    }
}

fn count_ok(data: &[u8]) -> usize {
    if data.len() < 2 {
        return 0;
    }
    data.windows(2).filter(|w| *w == b"OK").count()
}

#[cfg(test)]
mod tests {
    use hausbus_board_protocol::{
        CMD_RESET_BOARD, FULL_SYNC_MARKER, HALF_SYNC_MARKER, REPORT_DIGITAL,
    };
    use hausbus_mesh_protocol::{encode_frame, API_RX_PACKET, API_TX_REQUEST, API_TX_STATUS};

    use super::*;
    use crate::scheduler::{EndpointId, PortEvent};
    use crate::testing::{pipe, PipeTransport};
    use crate::time::BusTime;

    const BOARD_HW: HardwareAddress = HardwareAddress([0, 0x13, 0xA2, 0, 0x40, 0x8B, 0x12, 0x34]);
    const BOARD_SHORT: ShortAddress = ShortAddress(0x0002);

    fn roster() -> Vec<BoardMetadata> {
        vec![BoardMetadata {
            hardware_address: BOARD_HW,
            digital_start: 20,
            digital_count: 10,
            analog_start: 0,
            analog_count: 0,
            virtual_start: 0,
            virtual_count: 0,
        }]
    }

    fn config() -> MeshConfig {
        MeshConfig {
            command_mode_guard_s: 0.0,
            bringup_poll_interval_s: 0.0,
            bringup_poll_attempts: 3,
            ..MeshConfig::default()
        }
    }

    fn ctx<'a>(now: f64, out: &'a mut Outbox, events: &'a mut Vec<PortEvent>) -> LinkCtx<'a> {
        LinkCtx {
            now: BusTime::from_secs(now),
            source: LinkSource::Direct(EndpointId::fake(0)),
            out,
            events,
        }
    }

    /// A tunnel brought up against a pipe whose far end pre-acknowledged
    /// every command. Returns the far end with the AT chatter drained.
    fn ready_tunnel(ports: Vec<PortDef>) -> (MeshTunnel, PipeTransport) {
        let (mut ours, mut theirs) = pipe();
        theirs.try_write(b"OKOKOKOKOKOK").unwrap();
        let mut tunnel = MeshTunnel::new(ports, roster(), config(), LinkTimings::default());
        assert!(tunnel.bring_up(&mut ours));
        theirs.drain();
        (tunnel, theirs)
    }

    fn sample_ports() -> Vec<PortDef> {
        vec![
            PortDef::input("d22".parse().unwrap(), 100),
            PortDef::output("d23".parse().unwrap()),
        ]
    }

    /// Wrap a board-protocol payload in a receive packet from the test board.
    fn rx_frame(payload: &[u8]) -> Vec<u8> {
        let mut body = vec![API_RX_PACKET];
        body.extend_from_slice(BOARD_HW.as_bytes());
        body.extend_from_slice(&BOARD_SHORT.0.to_be_bytes());
        body.extend_from_slice(payload);
        encode_frame(&body)
    }

    fn tx_status_frame(frame_id: u8, status: u8) -> Vec<u8> {
        encode_frame(&[API_TX_STATUS, frame_id, status])
    }

    /// Decode every transmit request queued on `out`.
    fn decode_tx_requests(out: &mut Outbox) -> Vec<(u8, ShortAddress, Vec<u8>)> {
        let mut codec = ApiFrameCodec::new();
        codec.push(&out.take());
        let mut requests = Vec::new();
        while let Some(body) = codec.next_frame().unwrap() {
            assert_eq!(body[0], API_TX_REQUEST);
            requests.push((
                body[1],
                ShortAddress(u16::from_be_bytes([body[2], body[3]])),
                body[4..].to_vec(),
            ));
        }
        requests
    }

    #[test]
    fn test_bring_up_sends_command_sequence() {
        let (mut ours, mut theirs) = pipe();
        theirs.try_write(b"OKOKOKOKOKOK").unwrap();
        let mut tunnel = MeshTunnel::new(vec![], roster(), config(), LinkTimings::default());
        assert!(tunnel.bring_up(&mut ours));
        assert!(tunnel.is_ready());

        let chatter = String::from_utf8(theirs.drain()).unwrap();
        assert!(chatter.starts_with("+++"));
        assert!(chatter.contains("ATCE1\r"));
        assert!(chatter.contains("ATID3332\r"));
        assert!(chatter.contains("ATNJFF\r"));
        assert!(chatter.contains("ATEE0\r"));
        assert!(chatter.ends_with("ATCN\r"));
    }

    #[test]
    fn test_bring_up_without_acks_is_not_ready() {
        let (mut ours, _theirs) = pipe();
        let mut tunnel = MeshTunnel::new(vec![], roster(), config(), LinkTimings::default());
        assert!(!tunnel.bring_up(&mut ours));
        assert!(!tunnel.is_ready());

        // Inbound data is discarded while not ready.
        let (mut out, mut events) = (Outbox::default(), Vec::new());
        tunnel
            .on_data(&mut ctx(0.0, &mut out, &mut events), &rx_frame(&HALF_SYNC_MARKER))
            .unwrap();
        assert_eq!(tunnel.remote_count(), 0);
    }

    #[test]
    fn test_unconfigured_board_is_ignored() {
        let (mut tunnel, _theirs) = ready_tunnel(sample_ports());
        let (mut out, mut events) = (Outbox::default(), Vec::new());

        let mut body = vec![API_RX_PACKET];
        body.extend_from_slice(&[0xEE; 8]); // not in the roster
        body.extend_from_slice(&[0x00, 0x09]);
        body.extend_from_slice(&HALF_SYNC_MARKER);
        tunnel
            .on_data(&mut ctx(0.0, &mut out, &mut events), &encode_frame(&body))
            .unwrap();

        assert_eq!(tunnel.remote_count(), 0);
        assert!(out.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_first_packet_creates_remote_and_answers_probe() {
        let (mut tunnel, _theirs) = ready_tunnel(sample_ports());
        let (mut out, mut events) = (Outbox::default(), Vec::new());

        tunnel
            .on_data(&mut ctx(0.0, &mut out, &mut events), &rx_frame(&HALF_SYNC_MARKER))
            .unwrap();

        assert_eq!(tunnel.remote_count(), 1);
        let requests = decode_tx_requests(&mut out);
        // Attach probe, then the answer to the board's half marker.
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].1, BOARD_SHORT);
        assert_eq!(requests[0].2, HALF_SYNC_MARKER.to_vec());
        assert_eq!(requests[1].2, FULL_SYNC_MARKER.to_vec());
    }

    #[test]
    fn test_full_sync_initializes_remote_with_local_pins() {
        let (mut tunnel, _theirs) = ready_tunnel(sample_ports());
        let (mut out, mut events) = (Outbox::default(), Vec::new());

        tunnel
            .on_data(&mut ctx(0.0, &mut out, &mut events), &rx_frame(&FULL_SYNC_MARKER))
            .unwrap();

        let requests = decode_tx_requests(&mut out);
        // Probe from attach, then the initialization burst.
        assert_eq!(requests.len(), 2);
        let init = &requests[1].2;
        assert_eq!(init[0], CMD_RESET_BOARD);
        // d22 is the board's local wire pin 2 (slice starts at d20).
        assert!(init.windows(2).any(|w| w == [0, 2]));
    }

    #[test]
    fn test_remote_report_maps_to_global_port() {
        let (mut tunnel, _theirs) = ready_tunnel(sample_ports());
        let (mut out, mut events) = (Outbox::default(), Vec::new());

        tunnel
            .on_data(&mut ctx(0.0, &mut out, &mut events), &rx_frame(&FULL_SYNC_MARKER))
            .unwrap();
        out.take();
        tunnel
            .on_data(
                &mut ctx(1.0, &mut out, &mut events),
                &rx_frame(&[REPORT_DIGITAL, 2, 2, 1]),
            )
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].port, "d22".parse().unwrap());
        assert_eq!(events[0].value, 1);
        assert_eq!(
            events[0].source,
            LinkSource::Mesh {
                endpoint: EndpointId::fake(0),
                address: BOARD_SHORT
            }
        );
    }

    #[test]
    fn test_failed_status_retransmits_then_drops() {
        let (mut tunnel, _theirs) = ready_tunnel(sample_ports());
        let (mut out, mut events) = (Outbox::default(), Vec::new());

        tunnel
            .on_data(&mut ctx(0.0, &mut out, &mut events), &rx_frame(&HALF_SYNC_MARKER))
            .unwrap();
        let requests = decode_tx_requests(&mut out);
        let (frame_id, _, payload) = requests[0].clone();

        // Failure: the identical payload is resent under the same frame id.
        for round in 0..3 {
            tunnel
                .on_data(
                    &mut ctx(1.0, &mut out, &mut events),
                    &tx_status_frame(frame_id, 0x01),
                )
                .unwrap();
            let resent = decode_tx_requests(&mut out);
            assert_eq!(resent.len(), 1, "round {round}");
            assert_eq!(resent[0].0, frame_id);
            assert_eq!(resent[0].2, payload);
        }

        // Retransmit budget (3) spent: the next failure drops the message.
        let before = tunnel.transactions_in_flight();
        tunnel
            .on_data(
                &mut ctx(1.0, &mut out, &mut events),
                &tx_status_frame(frame_id, 0x01),
            )
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(tunnel.transactions_in_flight(), before - 1);
    }

    #[test]
    fn test_remote_timeout_removes_board_and_purges() {
        let (mut tunnel, _theirs) = ready_tunnel(sample_ports());
        let (mut out, mut events) = (Outbox::default(), Vec::new());

        tunnel
            .on_data(&mut ctx(0.0, &mut out, &mut events), &rx_frame(&HALF_SYNC_MARKER))
            .unwrap();
        assert_eq!(tunnel.remote_count(), 1);
        assert!(tunnel.transactions_in_flight() > 0);

        // Silence past the receive timeout kills the remote link only.
        tunnel.on_tick(&mut ctx(14.0, &mut out, &mut events)).unwrap();
        assert_eq!(tunnel.remote_count(), 0);
        assert_eq!(tunnel.transactions_in_flight(), 0);
    }

    #[test]
    fn test_set_port_is_tunneled_to_owning_board() {
        let (mut tunnel, _theirs) = ready_tunnel(sample_ports());
        let (mut out, mut events) = (Outbox::default(), Vec::new());

        tunnel
            .on_data(&mut ctx(0.0, &mut out, &mut events), &rx_frame(&FULL_SYNC_MARKER))
            .unwrap();
        out.take();

        // d23 belongs to the board's slice; d5 does not.
        tunnel.set_port(&mut ctx(1.0, &mut out, &mut events), &"d23".parse().unwrap(), 1);
        let requests = decode_tx_requests(&mut out);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, BOARD_SHORT);

        tunnel.set_port(&mut ctx(1.0, &mut out, &mut events), &"d5".parse().unwrap(), 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_keepalive_probes_are_tunneled() {
        let (mut tunnel, _theirs) = ready_tunnel(sample_ports());
        let (mut out, mut events) = (Outbox::default(), Vec::new());

        tunnel
            .on_data(&mut ctx(0.0, &mut out, &mut events), &rx_frame(&FULL_SYNC_MARKER))
            .unwrap();
        out.take();

        // Keep the remote alive but let its keepalive timer fire.
        tunnel
            .on_data(&mut ctx(10.0, &mut out, &mut events), &rx_frame(&[]))
            .unwrap();
        tunnel.on_tick(&mut ctx(10.0, &mut out, &mut events)).unwrap();
        let requests = decode_tx_requests(&mut out);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].2, FULL_SYNC_MARKER.to_vec());
    }
}
