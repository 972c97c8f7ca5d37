use spacebridge::config::BridgeConfig;
use spacebridge::device::{AxisSet, FilteredSample};
use spacebridge::hotkey::{HotkeyPhase, InjectionOutcome};
use spacebridge::motion::{Mode, PanZoomController, PanZoomSettings, PoseUpdate};
use spacebridge::receiver::{HeadlessHost, PaneKind, ReceiverError, ReceiverHandle};
use spacebridge::transport::{Datagram, DatagramPort, TransportError, WireMessage};
use nalgebra::Vector3;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

type Queue = Arc<Mutex<VecDeque<(Vec<u8>, SocketAddr)>>>;

/// In-memory port: tests push into `inbox` and read what the receiver sent
#[derive(Clone, Default)]
struct MemoryPort {
    inbox: Queue,
    sent: Queue,
}

impl MemoryPort {
    fn push(&self, datagram: &Datagram) {
        self.push_raw(datagram.encode());
    }

    fn push_raw(&self, bytes: Vec<u8>) {
        self.inbox.lock().unwrap().push_back((bytes, reader_addr()));
    }

    fn push_from(&self, datagram: &Datagram, from: SocketAddr) {
        self.inbox.lock().unwrap().push_back((datagram.encode(), from));
    }

    fn sent(&self) -> Vec<(Datagram, SocketAddr)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(bytes, to)| (Datagram::decode(bytes).unwrap(), *to))
            .collect()
    }
}

impl DatagramPort for MemoryPort {
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, TransportError> {
        Ok(self.inbox.lock().unwrap().pop_front().map(|(bytes, from)| {
            buf[..bytes.len()].copy_from_slice(&bytes);
            (bytes.len(), from)
        }))
    }

    fn send_to(&mut self, bytes: &[u8], target: SocketAddr) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push_back((bytes.to_vec(), target));
        Ok(())
    }
}

fn reader_addr() -> SocketAddr {
    "127.0.0.1:40001".parse().unwrap()
}

fn motion(sequence: u32, axes: [f32; 6], buttons: u32) -> Datagram {
    Datagram::Motion(WireMessage {
        sequence,
        send_ns: 0,
        sample: FilteredSample {
            axes: AxisSet::from_array(axes),
            buttons,
            sequence,
        },
    })
}

fn start(config: BridgeConfig) -> (ReceiverHandle, MemoryPort) {
    let port = MemoryPort::default();
    let handle = ReceiverHandle::start_with_port(config, Box::new(port.clone())).unwrap();
    (handle, port)
}

#[test]
fn backlog_applies_latest_axes_once_with_step_count() {
    let config = BridgeConfig::default();
    let expected_controller = PanZoomController::new(PanZoomSettings::from_config(&config.pan).unwrap());
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost::default();
    let initial = host.view;

    for i in 1..=5 {
        port.push(&motion(i, [0.2 * i as f32, 0.0, 0.0, 0.0, 0.0, 0.0], 0));
    }
    let report = handle.tick(&mut host).unwrap();

    assert_eq!(report.backlog, 5);
    assert_eq!(report.steps, 5);
    assert!(matches!(report.applied, Some(PoseUpdate::View(_))));
    assert_eq!(host.view_applies, 1);

    let last_axes = AxisSet::from_array([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let expected = expected_controller.step(&initial, &last_axes, 5).unwrap();
    assert!(host.view.approx_eq(&expected, 1e-9));
}

#[test]
fn samples_at_rest_do_not_touch_the_host() {
    let (mut handle, port) = start(BridgeConfig::default());
    let mut host = HeadlessHost::default();

    port.push(&motion(1, [0.0; 6], 0));
    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.steps, 1);
    assert!(report.applied.is_none());

    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.steps, 0);
    assert!(report.applied.is_none());
    assert_eq!(host.view_applies, 0);
}

#[test]
fn drain_cap_bounds_work_and_discards_overflow() {
    let mut config = BridgeConfig::default();
    config.receiver.drain_cap = 4;
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost::default();

    for i in 1..=10 {
        port.push(&motion(i, [0.5, 0.0, 0.0, 0.0, 0.0, 0.0], 0));
    }
    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.backlog, 4);
    assert_eq!(report.steps, 4);
    assert_eq!(report.overflow_dropped, 4);

    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.backlog, 2);
    assert_eq!(handle.counters().unwrap().overflow_dropped, 4);
}

#[test]
fn malformed_datagrams_are_counted_and_skipped() {
    let (mut handle, port) = start(BridgeConfig::default());
    let mut host = HeadlessHost::default();

    port.push_raw(vec![0xFF, 0x01]);
    port.push(&motion(1, [0.5, 0.0, 0.0, 0.0, 0.0, 0.0], 0));
    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.malformed, 1);
    assert_eq!(report.steps, 1);
    assert_eq!(host.view_applies, 1);
}

#[test]
fn hello_is_answered_with_receiver_pid() {
    let (mut handle, port) = start(BridgeConfig::default());
    let mut host = HeadlessHost::default();

    port.push(&Datagram::Hello {
        sequence: 0,
        send_ns: 1,
    });
    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.backlog, 1);
    assert_eq!(report.steps, 0);

    let replies = port.sent();
    assert!(replies.iter().any(|(datagram, to)| {
        *to == reader_addr()
            && matches!(datagram, Datagram::HelloReply { host_pid, .. } if *host_pid == std::process::id())
    }));
}

#[test]
fn stop_tells_the_reader_to_shut_down() {
    let (mut handle, port) = start(BridgeConfig::default());
    let mut host = HeadlessHost::default();

    port.push(&motion(1, [0.0; 6], 0));
    handle.tick(&mut host).unwrap();
    handle.stop();

    assert!(!handle.is_running());
    assert!(matches!(handle.tick(&mut host), Err(ReceiverError::Stopped)));
    assert!(port
        .sent()
        .iter()
        .any(|(datagram, to)| *to == reader_addr() && matches!(datagram, Datagram::Shutdown { .. })));
}

#[test]
fn mode_switch_takes_effect_on_next_tick() {
    let (mut handle, port) = start(BridgeConfig::default());
    let mut host = HeadlessHost::default();

    handle.set_mode(Mode::Orbit).unwrap();
    assert_eq!(handle.mode().unwrap(), Mode::Pan);

    // Axes queued under the old mode are dropped on the switching tick.
    port.push(&motion(1, [0.0, 0.0, 0.0, 0.0, 0.5, 0.0], 0));
    let report = handle.tick(&mut host).unwrap();
    assert_eq!(handle.mode().unwrap(), Mode::Orbit);
    assert_eq!(report.mode, Mode::Orbit);
    assert_eq!(report.steps, 1);
    assert!(report.applied.is_none());

    port.push(&motion(2, [0.0, 0.0, 0.0, 0.0, 0.5, 0.0], 0));
    let report = handle.tick(&mut host).unwrap();
    assert!(matches!(report.applied, Some(PoseUpdate::Camera(_))));
    assert_eq!(host.camera_applies, 1);
    assert_eq!(host.view_applies, 0);
}

#[test]
fn orbit_backlog_never_drives_the_spring_arm() {
    let mut config = BridgeConfig::default();
    config.mode = Mode::Orbit;
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost::default();
    let rotate = [0.0, 0.0, 0.0, 0.8, 0.8, 0.8];

    port.push(&motion(1, rotate, 0));
    handle.tick(&mut host).unwrap();
    assert_eq!(host.camera_applies, 1);
    let anchor = host.camera.pose;

    port.push(&motion(2, rotate, 0));
    port.push(&motion(3, rotate, 0));
    handle.set_mode(Mode::SpringArm).unwrap();
    let report = handle.tick(&mut host).unwrap();

    assert_eq!(report.mode, Mode::SpringArm);
    assert_eq!(report.steps, 2);
    assert!(matches!(report.applied, Some(PoseUpdate::FollowedObject(_))));
    assert_eq!(host.camera_applies, 1);
    assert!(handle.held_rotation().unwrap().angle() < 1e-12);

    // Yaw-only facing basis: +Z of the object points back at the anchor.
    let facing = host.followed.orientation * Vector3::z();
    let to_anchor = (anchor.position - host.followed.position).normalize();
    assert!(facing.dot(&to_anchor) > 1.0 - 1e-9);
    assert!((host.followed.position.y - anchor.position.y).abs() < 1e-9);
    let up = host.followed.orientation * Vector3::y();
    assert!((up - Vector3::y()).norm() < 1e-9);
}

#[test]
fn re_entering_spring_arm_clears_held_rotation() {
    let mut config = BridgeConfig::default();
    config.mode = Mode::SpringArm;
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost::default();

    port.push(&motion(1, [0.0, 0.0, 0.0, 0.8, 0.0, 0.0], 0));
    handle.tick(&mut host).unwrap();
    assert!(handle.held_rotation().unwrap().angle() > 0.0);

    handle.set_mode(Mode::Orbit).unwrap();
    handle.tick(&mut host).unwrap();
    handle.set_mode(Mode::SpringArm).unwrap();
    handle.tick(&mut host).unwrap();
    assert!(handle.held_rotation().unwrap().angle() < 1e-12);
}

#[test]
fn idle_spring_arm_applies_once_for_a_static_anchor() {
    let mut config = BridgeConfig::default();
    config.mode = Mode::SpringArm;
    let (mut handle, _port) = start(config);
    let mut host = HeadlessHost::default();

    let first = handle.tick(&mut host).unwrap();
    assert!(matches!(first.applied, Some(PoseUpdate::FollowedObject(_))));
    let placed = host.followed;

    for _ in 0..10 {
        let report = handle.tick(&mut host).unwrap();
        assert_eq!(report.steps, 0);
        assert!(report.applied.is_none());
    }
    assert_eq!(host.followed_applies, 1);
    assert_eq!(host.followed, placed);
}

#[test]
fn node_canvas_under_pointer_forces_pan() {
    let mut config = BridgeConfig::default();
    config.mode = Mode::Orbit;
    config.auto_mode_switch.enabled = true;
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost {
        pane: Some(PaneKind::NodeCanvas),
        ..HeadlessHost::default()
    };

    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.mode, Mode::Pan);

    port.push(&motion(1, [0.5, 0.0, 0.0, 0.0, 0.0, 0.0], 0));
    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.mode, Mode::Pan);
    assert_eq!(handle.mode().unwrap(), Mode::Orbit);
    assert_eq!(host.view_applies, 1);
    assert_eq!(host.camera_applies, 0);
}

#[test]
fn returning_from_auto_pan_resets_the_spring_arm() {
    let mut config = BridgeConfig::default();
    config.mode = Mode::SpringArm;
    config.auto_mode_switch.enabled = true;
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost::default();

    port.push(&motion(1, [0.0, 0.0, 0.0, 0.8, 0.0, 0.0], 0));
    handle.tick(&mut host).unwrap();
    assert!(handle.held_rotation().unwrap().angle() > 0.0);

    host.pane = Some(PaneKind::NodeCanvas);
    assert_eq!(handle.tick(&mut host).unwrap().mode, Mode::Pan);
    host.pane = None;
    assert_eq!(handle.tick(&mut host).unwrap().mode, Mode::SpringArm);
    assert!(handle.held_rotation().unwrap().angle() < 1e-12);
}

#[test]
fn press_and_release_within_one_tick_assert_then_deassert() {
    let config = BridgeConfig::from_toml_str(
        r#"
        [hotkeys.pan]
        button_1 = "ctrl+z"
        "#,
    )
    .unwrap();
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost::default();

    port.push(&motion(1, [0.0; 6], 0b1));
    port.push(&motion(2, [0.0; 6], 0b0));
    let report = handle.tick(&mut host).unwrap();

    let phases: Vec<HotkeyPhase> = report.hotkeys.iter().map(|e| e.phase).collect();
    assert_eq!(phases, vec![HotkeyPhase::Assert, HotkeyPhase::Deassert]);
    assert_eq!(host.hotkeys.len(), 2);

    let diagnostics = handle.diagnostics().unwrap();
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics
        .iter()
        .all(|record| matches!(record.outcome, InjectionOutcome::Delivered)));
}

#[test]
fn held_combo_is_released_on_stop() {
    let config = BridgeConfig::from_toml_str(
        r#"
        [hotkeys.pan]
        button_2 = "shift+f5"
        "#,
    )
    .unwrap();
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost::default();

    port.push(&motion(1, [0.0; 6], 0b10));
    handle.tick(&mut host).unwrap();
    assert_eq!(host.hotkeys.len(), 1);

    handle.stop_with_host(&mut host);
    assert_eq!(host.hotkeys.len(), 2);
    assert_eq!(host.hotkeys[1].phase, HotkeyPhase::Deassert);
}

#[test]
fn rejected_reload_keeps_running_state() {
    let (mut handle, port) = start(BridgeConfig::default());
    let mut host = HeadlessHost::default();

    let mut bad = BridgeConfig::default();
    bad.pan.pan_horizontal = "sideways".to_string();
    assert!(matches!(handle.reload_config(bad), Err(ReceiverError::Config(_))));

    port.push(&motion(1, [0.5, 0.0, 0.0, 0.0, 0.0, 0.0], 0));
    handle.tick(&mut host).unwrap();
    assert_eq!(host.view_applies, 1);
}

#[test]
fn reload_keeps_mode_and_swaps_speeds() {
    let (mut handle, port) = start(BridgeConfig::default());
    let mut host = HeadlessHost::default();

    let mut faster = BridgeConfig::default();
    faster.mode = Mode::SpringArm;
    faster.pan.pan_speed = 0.3;
    handle.reload_config(faster.clone()).unwrap();
    assert_eq!(handle.mode().unwrap(), Mode::Pan);

    let initial = host.view;
    port.push(&motion(1, [0.5, 0.0, 0.0, 0.0, 0.0, 0.0], 0));
    handle.tick(&mut host).unwrap();

    let controller = PanZoomController::new(PanZoomSettings::from_config(&faster.pan).unwrap());
    let expected = controller
        .step(&initial, &AxisSet::from_array([0.5, 0.0, 0.0, 0.0, 0.0, 0.0]), 1)
        .unwrap();
    assert!(host.view.approx_eq(&expected, 1e-9));
}

#[test]
fn spring_arm_reset_hotkey_clears_held_rotation() {
    let config = BridgeConfig::from_toml_str(
        r#"
        mode = "spring_arm"

        [hotkeys.spring_arm]
        button_1 = "reset_rotation"
        "#,
    )
    .unwrap();
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost::default();

    port.push(&motion(1, [0.0, 0.0, 0.0, 0.8, 0.0, 0.0], 0));
    handle.tick(&mut host).unwrap();
    assert!(handle.held_rotation().unwrap().angle() > 0.0);

    port.push(&motion(2, [0.0; 6], 0b1));
    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.hotkeys.len(), 1);
    assert!(handle.held_rotation().unwrap().angle() < 1e-9);
    // Reset is handled inside the receiver, not injected into the host.
    assert!(host.hotkeys.is_empty());
}

#[test]
fn reset_wins_over_rotation_in_the_same_tick() {
    let config = BridgeConfig::from_toml_str(
        r#"
        mode = "spring_arm"

        [hotkeys.spring_arm]
        button_1 = "reset_rotation"
        "#,
    )
    .unwrap();
    let (mut handle, port) = start(config);
    let mut host = HeadlessHost::default();
    let rotate = [0.0, 0.0, 0.0, 0.8, 0.4, 0.2];

    port.push(&motion(1, rotate, 0));
    handle.tick(&mut host).unwrap();
    assert!(handle.held_rotation().unwrap().angle() > 0.0);

    port.push(&motion(2, rotate, 0b1));
    port.push(&motion(3, rotate, 0b1));
    let report = handle.tick(&mut host).unwrap();
    assert_eq!(report.hotkeys.len(), 1);
    assert!(handle.held_rotation().unwrap().angle() < 1e-12);

    let up = host.followed.orientation * Vector3::y();
    assert!((up - Vector3::y()).norm() < 1e-9);
}

#[test]
fn relaunched_reader_restarts_sequence_tracking() {
    let (mut handle, port) = start(BridgeConfig::default());
    let mut host = HeadlessHost::default();

    port.push(&Datagram::Hello { sequence: 0, send_ns: 0 });
    for i in 1..=100 {
        port.push(&motion(i, [0.1, 0.0, 0.0, 0.0, 0.0, 0.0], 0));
    }
    handle.tick(&mut host).unwrap();

    let relaunched: SocketAddr = "127.0.0.1:40002".parse().unwrap();
    port.push_from(&Datagram::Hello { sequence: 0, send_ns: 0 }, relaunched);
    for i in [1, 2, 4] {
        port.push_from(&motion(i, [0.1, 0.0, 0.0, 0.0, 0.0, 0.0], 0), relaunched);
    }
    handle.tick(&mut host).unwrap();

    let perf = handle.perf_snapshot().unwrap();
    assert_eq!(perf.reordered, 0);
    assert_eq!(perf.skipped, 1);
}
