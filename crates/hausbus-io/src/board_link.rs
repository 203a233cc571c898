//! The board link: sync handshake, initialization, and report parsing for
//! one microcontroller board.
//!
//! A link starts unsynced and probes with the half-sync marker, backing off
//! while the board stays silent. The board answers a probe with its own
//! marker; seeing the full-sync marker means both sides are aligned, at which
//! point the link resets the board and replays its port configuration. Any
//! corruption after sync (unknown type byte, oversized length, a reading
//! that maps to no configured port) throws the link back to unsynced with a
//! cleared buffer; the resync handshake recovers the stream.

use std::collections::HashMap;

use bytes::{Buf, BytesMut};

use hausbus_board_protocol::{
    find_sync, take_message, AddressingWindows, Command, PinMode, PortName, Report, SyncMarker,
    FULL_SYNC_MARKER, SYNC_MARKER_LEN,
};

use crate::config::LinkTimings;
use crate::error::LinkFault;
use crate::scheduler::{LinkCtx, LinkHandler};
use crate::time::BusTime;

/// How a configured port is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// The board reads the pin and reports it every `interval_ms`.
    Input {
        /// Reporting interval in milliseconds.
        interval_ms: u16,
    },
    /// The middleware drives the pin.
    Output,
}

/// One port in the link's configuration, replayed on every (re)sync.
#[derive(Debug, Clone)]
pub struct PortDef {
    /// The port, in the global index space.
    pub port: PortName,
    /// Input or output.
    pub kind: PortKind,
    /// Device setup payload for virtual ports.
    pub setup: Option<Vec<u8>>,
}

impl PortDef {
    /// An input port reported every `interval_ms` milliseconds.
    pub fn input(port: PortName, interval_ms: u16) -> Self {
        PortDef {
            port,
            kind: PortKind::Input { interval_ms },
            setup: None,
        }
    }

    /// An output port.
    pub fn output(port: PortName) -> Self {
        PortDef {
            port,
            kind: PortKind::Output,
            setup: None,
        }
    }

    /// A virtual input port with a device setup payload.
    pub fn virtual_input(port: PortName, interval_ms: u16, setup: Vec<u8>) -> Self {
        PortDef {
            port,
            kind: PortKind::Input { interval_ms },
            setup: Some(setup),
        }
    }
}

/// Sync handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// Probing; nothing from the board yet.
    Unsynced,
    /// The board's probe was seen but not its answer to ours.
    HalfSynced,
    /// Stream aligned; messages are parsed.
    FullSynced,
}

/// Protocol engine for one directly attached board.
pub struct BoardLink {
    state: SyncState,
    /// Unparsed received bytes.
    rx: BytesMut,
    /// Port configuration replayed after every sync.
    ports: Vec<PortDef>,
    windows: AddressingWindows,
    timings: LinkTimings,
    /// Current probe interval; doubles while unsynced.
    probe_period_s: f64,
    /// When the next probe (or keepalive) is due.
    probe_at: BusTime,
    /// Silence past this point is a fault.
    receive_deadline: BusTime,
    /// Last value written per port, to suppress duplicate commands.
    written: HashMap<PortName, u16>,
}

impl BoardLink {
    /// A link to a directly attached board (unrestricted addressing).
    pub fn new(ports: Vec<PortDef>, timings: LinkTimings) -> Self {
        BoardLink::with_windows(ports, timings, AddressingWindows::open())
    }

    /// A link whose board owns only a slice of the port index space.
    pub fn with_windows(
        ports: Vec<PortDef>,
        timings: LinkTimings,
        windows: AddressingWindows,
    ) -> Self {
        BoardLink {
            state: SyncState::Unsynced,
            rx: BytesMut::new(),
            ports,
            windows,
            timings,
            probe_period_s: timings.probe_period_s,
            probe_at: BusTime::ZERO,
            receive_deadline: BusTime::ZERO,
            written: HashMap::new(),
        }
    }

    /// Whether the link is fully synced.
    pub fn is_synced(&self) -> bool {
        self.state == SyncState::FullSynced
    }

    /// Send the probe appropriate for the current state and schedule the
    /// next one. Unsynced probes back off exponentially up to the cap.
    fn send_probe(&mut self, ctx: &mut LinkCtx<'_>) {
        let marker = match self.state {
            SyncState::Unsynced => SyncMarker::Half,
            SyncState::HalfSynced | SyncState::FullSynced => SyncMarker::Full,
        };
        ctx.send(marker.bytes());

        match self.state {
            SyncState::Unsynced => {
                self.probe_at = ctx.now.plus(self.probe_period_s);
                self.probe_period_s =
                    (self.probe_period_s * 2.0).min(self.timings.probe_backoff_cap_s);
            }
            SyncState::HalfSynced => {
                self.probe_at = ctx.now.plus(self.timings.probe_period_s);
            }
            SyncState::FullSynced => {
                self.probe_at = ctx.now.plus(self.timings.keepalive_period_s);
            }
        }
    }

    /// Drop to unsynced, clear the buffer, and probe immediately.
    fn resync(&mut self, ctx: &mut LinkCtx<'_>) {
        self.state = SyncState::Unsynced;
        self.rx.clear();
        self.probe_period_s = self.timings.probe_period_s;
        self.send_probe(ctx);
    }

    /// Reset the board and replay the port configuration.
    fn initialize(&mut self, ctx: &mut LinkCtx<'_>) {
        log::info!("link {} synced, initializing board", ctx.source.endpoint());
        let windows = self.windows;
        ctx.send(&Command::ResetBoard.encode(&windows));
        for def in &self.ports {
            let configure = match &def.setup {
                Some(setup) => Command::SetVirtualPinMode {
                    port: def.port.clone(),
                    setup: setup.clone(),
                },
                None => Command::SetPinMode {
                    port: def.port.clone(),
                    mode: match def.kind {
                        PortKind::Input { .. } => PinMode::Input,
                        PortKind::Output => PinMode::Output,
                    },
                },
            };
            ctx.send(&configure.encode(&windows));
            if let PortKind::Input { interval_ms } = def.kind {
                ctx.send(
                    &Command::RegisterPinListener {
                        port: def.port.clone(),
                        interval_ms,
                    }
                    .encode(&windows),
                );
            }
        }
        // The board reset forgot every output; cached values are stale.
        self.written.clear();
    }

    fn enter_full_sync(&mut self, ctx: &mut LinkCtx<'_>) {
        self.state = SyncState::FullSynced;
        self.probe_period_s = self.timings.probe_period_s;
        self.probe_at = ctx.now.plus(self.timings.keepalive_period_s);
        self.initialize(ctx);
    }

    /// Parse everything parseable out of the receive buffer.
    fn process(&mut self, ctx: &mut LinkCtx<'_>) {
        loop {
            match self.state {
                SyncState::Unsynced | SyncState::HalfSynced => {
                    if let Some((marker, end)) = find_sync(&self.rx) {
                        self.rx.advance(end);
                        match marker {
                            SyncMarker::Half => {
                                if self.state == SyncState::Unsynced {
                                    self.state = SyncState::HalfSynced;
                                    self.probe_period_s = self.timings.probe_period_s;
                                    self.send_probe(ctx);
                                }
                            }
                            SyncMarker::Full => self.enter_full_sync(ctx),
                        }
                        continue;
                    }
                    // No marker: keep only a potential marker prefix, the
                    // rest is pre-sync garbage and must never be parsed.
                    if self.rx.len() >= SYNC_MARKER_LEN {
                        let excess = self.rx.len() - (SYNC_MARKER_LEN - 1);
                        self.rx.advance(excess);
                    }
                    break;
                }

                SyncState::FullSynced => {
                    if self.rx.is_empty() {
                        break;
                    }
                    // A repeated full-sync marker between messages is a
                    // no-op, not corruption.
                    let n = self.rx.len().min(SYNC_MARKER_LEN);
                    if self.rx[..n] == FULL_SYNC_MARKER[..n] {
                        if n == SYNC_MARKER_LEN {
                            self.rx.advance(n);
                            continue;
                        }
                        break; // could be a marker prefix, wait for more
                    }

                    match take_message(&self.rx) {
                        Ok(Some((msg, consumed))) => {
                            self.rx.advance(consumed);
                            let report = match Report::decode(&msg) {
                                Ok(report) => report,
                                Err(err) => {
                                    log::warn!(
                                        "link {}: bad report ({err}), forcing resync",
                                        ctx.source.endpoint()
                                    );
                                    self.resync(ctx);
                                    continue;
                                }
                            };
                            match report.port(&self.windows) {
                                Some(port) => ctx.report(port, report.value()),
                                None => {
                                    log::warn!(
                                        "link {}: report for unowned pin {}, forcing resync",
                                        ctx.source.endpoint(),
                                        report.pin()
                                    );
                                    self.resync(ctx);
                                    continue;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            log::warn!(
                                "link {}: stream corrupt ({err}), forcing resync",
                                ctx.source.endpoint()
                            );
                            self.resync(ctx);
                            continue;
                        }
                    }
                }
            }
        }
    }
}

impl LinkHandler for BoardLink {
    fn on_attach(&mut self, ctx: &mut LinkCtx<'_>) {
        self.receive_deadline = ctx.now.plus(self.timings.receive_timeout_s);
        self.send_probe(ctx);
    }

    fn on_data(&mut self, ctx: &mut LinkCtx<'_>, data: &[u8]) -> Result<(), LinkFault> {
        self.receive_deadline = ctx.now.plus(self.timings.receive_timeout_s);
        self.rx.extend_from_slice(data);
        self.process(ctx);
        Ok(())
    }

    fn on_tick(&mut self, ctx: &mut LinkCtx<'_>) -> Result<(), LinkFault> {
        if ctx.now > self.receive_deadline {
            return Err(LinkFault::ReceiveTimeout {
                timeout_s: self.timings.receive_timeout_s,
            });
        }
        if ctx.now >= self.probe_at {
            self.send_probe(ctx);
        }
        Ok(())
    }

    fn set_port(&mut self, ctx: &mut LinkCtx<'_>, port: &PortName, value: u16) {
        if self.state != SyncState::FullSynced {
            return;
        }
        if self.written.get(port) == Some(&value) {
            return;
        }
        let wire = Command::SetPinOutput {
            port: port.clone(),
            value,
        }
        .encode(&self.windows);
        // Empty means the port is not in this board's slice.
        if wire.is_empty() {
            return;
        }
        ctx.send(&wire);
        self.written.insert(port.clone(), value);
    }
}
