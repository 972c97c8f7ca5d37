//! Host-embedded receiver
//!
//! The host calls [`ReceiverHandle::tick`] once per frame. Each tick drains
//! the datagram queue without blocking, reduces it to the latest axes plus an
//! ordered list of button edges, and pushes the result through the active
//! motion controller and the hotkey detector.
//!
//! Axes queued before a mode entry or a spring-arm rotation reset are not
//! applied on that tick; their button edges still count.
//!
//! ```text
//! port ──► drain ──► reduce ──┬──► controller ──► Host::apply_*
//!                             └──► detector   ──► Host::invoke_hotkey ──► diagnostics
//! ```

use super::drain::{self, TickBatch};
use super::host::{Host, PaneKind, PoseTarget};
use super::ReceiverError;
use crate::config::BridgeConfig;
use crate::device::sample::AxisSet;
use crate::hotkey::{
    ButtonEdgeEvent, HotkeyAction, HotkeyBinding, HotkeyDetector, HotkeyDiagnostics, HotkeyEvent,
    HotkeyPhase, InjectionOutcome,
};
use crate::motion::{ControllerSet, HostFrame, Mode, Pose, PoseUpdate, ViewBounds};
use crate::telemetry::{wall_clock_ns, Telemetry};
use crate::transport::{
    loopback, Datagram, DatagramPort, PerfReport, UdpPort, WireMessage, MAX_DATAGRAM_LEN,
};
use nalgebra::UnitQuaternion;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// Poses closer than this to the last applied one are not written again
pub const APPLY_TOLERANCE: f64 = 1e-9;

/// Outcome of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick_sequence: u64,
    /// Mode the tick ran in, after auto switching
    pub mode: Mode,
    /// Datagrams taken off the queue, any kind
    pub backlog: u32,
    /// Motion datagrams among them
    pub steps: u32,
    pub overflow_dropped: u32,
    pub malformed: u32,
    pub edges: Vec<ButtonEdgeEvent>,
    pub hotkeys: Vec<HotkeyEvent>,
    pub applied: Option<PoseUpdate>,
}

/// Running totals since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverCounters {
    pub ticks: u64,
    pub motion: u64,
    pub malformed: u64,
    pub overflow_dropped: u64,
    pub hellos: u64,
    pub applies: u64,
}

struct Drained {
    messages: Vec<WireMessage>,
    backlog: u32,
    overflow_dropped: u32,
    malformed: u32,
}

struct ReceiverCore {
    config: BridgeConfig,
    port: Box<dyn DatagramPort>,
    buffer: [u8; MAX_DATAGRAM_LEN],
    controllers: ControllerSet,
    bindings: HashMap<Mode, Vec<HotkeyBinding>>,
    detector: HotkeyDetector,
    diagnostics: HotkeyDiagnostics,
    telemetry: Telemetry,
    counters: ReceiverCounters,
    mode: Mode,
    pending_mode: Option<Mode>,
    effective_mode: Mode,
    pending_hotkeys: Vec<HotkeyEvent>,
    committed_buttons: u32,
    /// Set when `reset_rotation` fired this tick
    rotation_reset: bool,
    /// Set when this tick entered a new mode
    mode_entered: bool,
    last_view: Option<ViewBounds>,
    last_camera: Option<Pose>,
    last_followed: Option<Pose>,
    last_sender: Option<SocketAddr>,
    tick_sequence: u64,
}

/// Owner of a running receiver
///
/// `stop` (or drop) releases held hotkeys, tells the reader to shut down and
/// closes the port. Every other call on a stopped handle returns
/// [`ReceiverError::Stopped`].
pub struct ReceiverHandle {
    inner: Option<ReceiverCore>,
}

impl ReceiverHandle {
    /// Binds the loopback port from `transport.port` and starts in `config.mode`
    pub fn start(config: BridgeConfig) -> Result<Self, ReceiverError> {
        let port = UdpPort::bind(loopback(config.transport.port))?;
        info!("Receiver listening on {}", port.local_addr()?);
        Self::start_with_port(config, Box::new(port))
    }

    pub fn start_with_port(
        config: BridgeConfig,
        port: Box<dyn DatagramPort>,
    ) -> Result<Self, ReceiverError> {
        config.validate()?;
        let controllers = ControllerSet::from_config(&config)?;
        let bindings = resolve_all_bindings(&config)?;
        let mode = config.mode;
        let detector = HotkeyDetector::new(bindings.get(&mode).cloned().unwrap_or_default());

        info!("Receiver started in {} mode", mode);
        Ok(Self {
            inner: Some(ReceiverCore {
                diagnostics: HotkeyDiagnostics::with_capacity(config.receiver.diagnostics_capacity),
                config,
                port,
                buffer: [0; MAX_DATAGRAM_LEN],
                controllers,
                bindings,
                detector,
                telemetry: Telemetry::default(),
                counters: ReceiverCounters::default(),
                mode,
                pending_mode: None,
                effective_mode: mode,
                pending_hotkeys: Vec::new(),
                committed_buttons: 0,
                rotation_reset: false,
                mode_entered: false,
                last_view: None,
                last_camera: None,
                last_followed: None,
                last_sender: None,
                tick_sequence: 0,
            }),
        })
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_some()
    }

    fn core(&self) -> Result<&ReceiverCore, ReceiverError> {
        self.inner.as_ref().ok_or(ReceiverError::Stopped)
    }

    fn core_mut(&mut self) -> Result<&mut ReceiverCore, ReceiverError> {
        self.inner.as_mut().ok_or(ReceiverError::Stopped)
    }

    pub fn tick(&mut self, host: &mut dyn Host) -> Result<TickReport, ReceiverError> {
        Ok(self.core_mut()?.tick(host))
    }

    /// Requests a mode switch, committed at the start of the next tick
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), ReceiverError> {
        let core = self.core_mut()?;
        debug!("Mode switch to {} requested", mode);
        core.pending_mode = Some(mode);
        Ok(())
    }

    /// Committed mode, ignoring auto switching and pending requests
    pub fn mode(&self) -> Result<Mode, ReceiverError> {
        Ok(self.core()?.mode)
    }

    /// Validates `config` and swaps in its speeds, mappings, bindings and caps
    ///
    /// Mode and port stay as they are. On error nothing changes.
    pub fn reload_config(&mut self, config: BridgeConfig) -> Result<(), ReceiverError> {
        let core = self.core_mut()?;
        config.validate()?;
        let bindings = resolve_all_bindings(&config)?;
        core.controllers.reload(&config)?;

        if config.transport.port != core.config.transport.port {
            warn!(
                "Port change to {} takes effect after restart",
                config.transport.port
            );
        }
        let active = bindings.get(&core.effective_mode).cloned().unwrap_or_default();
        let released = core.detector.set_bindings(active, core.tick_sequence);
        core.pending_hotkeys.extend(released);
        core.diagnostics
            .set_capacity(config.receiver.diagnostics_capacity);
        core.bindings = bindings;
        core.config = BridgeConfig {
            mode: core.config.mode,
            transport: core.config.transport.clone(),
            ..config
        };

        info!("Receiver configuration reloaded");
        Ok(())
    }

    pub fn diagnostics(&self) -> Result<&HotkeyDiagnostics, ReceiverError> {
        Ok(&self.core()?.diagnostics)
    }

    pub fn counters(&self) -> Result<ReceiverCounters, ReceiverError> {
        Ok(self.core()?.counters)
    }

    pub fn telemetry(&self) -> Result<&Telemetry, ReceiverError> {
        Ok(&self.core()?.telemetry)
    }

    pub fn perf_snapshot(&self) -> Result<PerfReport, ReceiverError> {
        Ok(self.core()?.telemetry.snapshot(wall_clock_ns()))
    }

    pub fn held_rotation(&self) -> Result<UnitQuaternion<f64>, ReceiverError> {
        Ok(self.core()?.controllers.spring_arm().held_rotation())
    }

    /// Stops without a host; released holds are only recorded
    pub fn stop(&mut self) {
        if let Some(core) = self.inner.take() {
            core.shutdown(None);
        }
    }

    /// Stops and delivers the final deasserts to `host`
    pub fn stop_with_host(&mut self, host: &mut dyn Host) {
        if let Some(core) = self.inner.take() {
            core.shutdown(Some(host));
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolve_all_bindings(
    config: &BridgeConfig,
) -> Result<HashMap<Mode, Vec<HotkeyBinding>>, ReceiverError> {
    Mode::ALL
        .iter()
        .map(|&mode| Ok((mode, config.bindings_for(mode)?)))
        .collect()
}

impl ReceiverCore {
    fn tick(&mut self, host: &mut dyn Host) -> TickReport {
        self.tick_sequence += 1;
        let sequence = self.tick_sequence;
        self.counters.ticks += 1;
        self.rotation_reset = false;
        self.mode_entered = false;
        self.commit_pending_mode();

        let drained = self.drain();
        let batch = drain::reduce(self.committed_buttons, &drained.messages, sequence);
        self.committed_buttons = batch.committed_buttons;
        self.record_telemetry(&drained, &batch);

        let effective = self.effective_mode(host);
        let mut hotkeys = std::mem::take(&mut self.pending_hotkeys);
        if effective != self.effective_mode {
            info!("Effective mode {} -> {}", self.effective_mode, effective);
            // Automatic switches enter a mode the same way a committed switch does.
            self.controllers.get_mut(effective).reset();
            self.mode_entered = true;
            let active = self.bindings.get(&effective).cloned().unwrap_or_default();
            hotkeys.extend(self.detector.set_bindings(active, sequence));
            self.effective_mode = effective;
        }
        hotkeys.extend(self.detector.on_edges(&batch.edges));
        for event in &hotkeys {
            self.deliver(Some(&mut *host), effective, event);
        }

        let apply_start = wall_clock_ns();
        let applied = self
            .dispatch(host, effective, &batch)
            .and_then(|update| self.apply(host, update));
        if applied.is_some() {
            self.telemetry.apply.record(apply_start, wall_clock_ns());
            self.counters.applies += 1;
        }

        self.maybe_send_perf();

        TickReport {
            tick_sequence: sequence,
            mode: effective,
            backlog: drained.backlog,
            steps: batch.steps,
            overflow_dropped: drained.overflow_dropped,
            malformed: drained.malformed,
            edges: batch.edges,
            hotkeys,
            applied,
        }
    }

    fn commit_pending_mode(&mut self) {
        let Some(mode) = self.pending_mode.take() else {
            return;
        };
        if mode == self.mode {
            return;
        }
        info!("Mode {} -> {}", self.mode, mode);
        self.mode = mode;
        self.controllers.get_mut(mode).reset();
        self.mode_entered = true;
    }

    fn effective_mode(&self, host: &dyn Host) -> Mode {
        let auto = &self.config.auto_mode_switch;
        if auto.enabled
            && auto.pan_under_pointer
            && host.pane_under_pointer() == Some(PaneKind::NodeCanvas)
        {
            Mode::Pan
        } else {
            self.mode
        }
    }

    /// Takes up to `drain_cap` datagrams, then discards up to as many again
    fn drain(&mut self) -> Drained {
        let cap = self.config.receiver.drain_cap;
        let mut drained = Drained {
            messages: Vec::new(),
            backlog: 0,
            overflow_dropped: 0,
            malformed: 0,
        };

        while (drained.backlog as usize) < cap {
            let (len, from) = match self.port.try_recv(&mut self.buffer) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => {
                    warn!("Receive failed: {}", e);
                    break;
                }
            };
            drained.backlog += 1;

            match Datagram::decode(&self.buffer[..len]) {
                Ok(Datagram::Motion(message)) => {
                    if self.last_sender.is_some_and(|last| last != from) {
                        self.restart_sender(from);
                    }
                    self.last_sender = Some(from);
                    drained.messages.push(message);
                }
                Ok(Datagram::Hello { sequence, .. }) => {
                    // A reader numbers its hellos from zero on every launch.
                    if sequence == 0 || self.last_sender != Some(from) {
                        self.restart_sender(from);
                    }
                    self.last_sender = Some(from);
                    self.counters.hellos += 1;
                    debug!("Hello #{} from {}", sequence, from);
                    let reply = Datagram::HelloReply {
                        host_pid: std::process::id(),
                        recv_ns: wall_clock_ns(),
                    };
                    if let Err(e) = self.port.send_to(&reply.encode(), from) {
                        debug!("Failed to answer hello: {}", e);
                    }
                }
                Ok(other) => debug!("Ignoring unexpected datagram kind {}", other.kind()),
                Err(e) => {
                    drained.malformed += 1;
                    debug!("Malformed datagram from {}: {}", from, e);
                }
            }
        }

        if drained.backlog as usize == cap {
            while (drained.overflow_dropped as usize) < cap {
                match self.port.try_recv(&mut self.buffer) {
                    Ok(Some(_)) => drained.overflow_dropped += 1,
                    _ => break,
                }
            }
            if drained.overflow_dropped > 0 {
                warn!(
                    "Backlog over drain cap, dropped {} datagrams",
                    drained.overflow_dropped
                );
            }
        }

        self.counters.motion += drained.messages.len() as u64;
        self.counters.malformed += u64::from(drained.malformed);
        self.counters.overflow_dropped += u64::from(drained.overflow_dropped);
        drained
    }

    fn restart_sender(&mut self, from: SocketAddr) {
        info!("Reader at {} (re)started, sequence tracking restarted", from);
        self.telemetry.sequence.restart();
    }

    fn record_telemetry(&mut self, drained: &Drained, batch: &TickBatch) {
        if batch.steps == 0 {
            return;
        }
        self.telemetry.backlog.record(drained.backlog);
        for message in &drained.messages {
            self.telemetry.sequence.observe(message.sequence);
        }
        if let Some(latest) = &batch.latest {
            self.telemetry.record_latency(latest.send_ns, wall_clock_ns());
        }
    }

    fn deliver(&mut self, host: Option<&mut (dyn Host + '_)>, mode: Mode, event: &HotkeyEvent) {
        let outcome = match (&event.action, host) {
            (HotkeyAction::ResetRotation, _) if mode != Mode::SpringArm => {
                InjectionOutcome::Rejected(format!("reset_rotation has no effect in {} mode", mode))
            }
            (HotkeyAction::ResetRotation, _) => {
                if event.phase != HotkeyPhase::Deassert {
                    self.controllers.spring_arm_mut().reset_held_rotation();
                    self.rotation_reset = true;
                }
                InjectionOutcome::Delivered
            }
            (_, Some(host)) => host.invoke_hotkey(event),
            (_, None) => InjectionOutcome::Unknown,
        };
        debug!(
            "Hotkey button {} {:?} {} -> {:?}",
            event.button, event.phase, event.action, outcome
        );
        self.diagnostics.record(mode, event, outcome);
    }

    fn dispatch(&mut self, host: &dyn Host, mode: Mode, batch: &TickBatch) -> Option<PoseUpdate> {
        let fresh = batch.steps > 0 && !self.rotation_reset && !self.mode_entered;
        let (axes, steps) = match batch.latest_sample() {
            Some(sample) if fresh => (sample.axes, batch.steps),
            // Idle tick, or axes queued before a mode entry or rotation
            // reset: only the spring arm keeps tracking its anchor.
            _ if mode == Mode::SpringArm => (AxisSet::default(), 0),
            _ => return None,
        };

        let frame = match mode {
            Mode::Pan => HostFrame {
                view: host.view_bounds(),
                ..HostFrame::default()
            },
            Mode::Orbit | Mode::FirstPerson => HostFrame {
                camera: host.camera_rig(),
                ..HostFrame::default()
            },
            Mode::SpringArm => HostFrame {
                anchor: host.anchor_pose(),
                ..HostFrame::default()
            },
        };
        self.controllers.get_mut(mode).update(&axes, steps, &frame)
    }

    /// Writes `update` unless it matches what was last applied to that target
    fn apply(&mut self, host: &mut dyn Host, update: PoseUpdate) -> Option<PoseUpdate> {
        match update {
            PoseUpdate::View(bounds) => {
                if self
                    .last_view
                    .is_some_and(|last| last.approx_eq(&bounds, APPLY_TOLERANCE))
                {
                    return None;
                }
                host.apply_view_bounds(bounds);
                self.last_view = Some(bounds);
            }
            PoseUpdate::Camera(pose) => {
                if !pose_changed(&self.last_camera, &pose) {
                    return None;
                }
                host.apply_pose(PoseTarget::Camera, pose);
                self.last_camera = Some(pose);
            }
            PoseUpdate::FollowedObject(pose) => {
                if !pose_changed(&self.last_followed, &pose) {
                    return None;
                }
                host.apply_pose(PoseTarget::FollowedObject, pose);
                self.last_followed = Some(pose);
            }
        }
        Some(update)
    }

    fn maybe_send_perf(&mut self) {
        let Some(target) = self.last_sender else {
            return;
        };
        let now = wall_clock_ns();
        let interval_ns = 1_000_000_000 / u64::from(self.config.receiver.perf_reply_hz.max(1));
        if !self.telemetry.perf_due(now, interval_ns) {
            return;
        }
        let report = Datagram::Perf(self.telemetry.snapshot(now));
        if let Err(e) = self.port.send_to(&report.encode(), target) {
            debug!("Failed to send perf report: {}", e);
        }
    }

    fn shutdown(mut self, mut host: Option<&mut dyn Host>) {
        let sequence = self.tick_sequence;
        let mode = self.effective_mode;
        for event in self.detector.release_all(sequence) {
            let target = host.as_deref_mut();
            self.deliver(target, mode, &event);
        }

        if let Some(target) = self.last_sender {
            let shutdown = Datagram::Shutdown {
                send_ns: wall_clock_ns(),
            };
            match self.port.send_to(&shutdown.encode(), target) {
                Ok(()) => info!("Sent shutdown to reader at {}", target),
                Err(e) => debug!("Failed to send shutdown: {}", e),
            }
        }
        info!(
            "Receiver stopped after {} ticks ({} motion, {} malformed, {} overflow)",
            self.counters.ticks,
            self.counters.motion,
            self.counters.malformed,
            self.counters.overflow_dropped
        );
    }
}

fn pose_changed(last: &Option<Pose>, next: &Pose) -> bool {
    !last.is_some_and(|last| last.approx_eq(next, APPLY_TOLERANCE))
}
