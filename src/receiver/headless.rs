use super::host::{Host, PaneKind, PoseTarget};
use crate::hotkey::{HotkeyEvent, InjectionOutcome};
use crate::motion::{CameraRig, Pose, ViewBounds};
use nalgebra::{UnitQuaternion, Vector3};
use tracing::info;

/// In-memory scene standing in for a 3D application
///
/// Writes land in the fields the next tick reads from, so the receiver sees
/// its own output the way it would in a real host.
#[derive(Debug, Clone)]
pub struct HeadlessHost {
    pub view: ViewBounds,
    pub camera: CameraRig,
    pub followed: Pose,
    pub pane: Option<PaneKind>,
    pub view_applies: u64,
    pub camera_applies: u64,
    pub followed_applies: u64,
    pub hotkeys: Vec<HotkeyEvent>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self {
            view: ViewBounds::from_center(0.0, 0.0, 100.0, 100.0),
            camera: CameraRig {
                pose: Pose::new(Vector3::new(0.0, 0.0, 10.0), UnitQuaternion::identity()),
                pivot: Vector3::zeros(),
            },
            followed: Pose::identity(),
            pane: None,
            view_applies: 0,
            camera_applies: 0,
            followed_applies: 0,
            hotkeys: Vec::new(),
        }
    }
}

impl Host for HeadlessHost {
    fn view_bounds(&self) -> Option<ViewBounds> {
        Some(self.view)
    }

    fn camera_rig(&self) -> Option<CameraRig> {
        Some(self.camera)
    }

    fn pane_under_pointer(&self) -> Option<PaneKind> {
        self.pane
    }

    fn apply_view_bounds(&mut self, bounds: ViewBounds) {
        let (cx, cy) = bounds.center();
        info!(
            "View center ({:.3}, {:.3}) size {:.3} x {:.3}",
            cx,
            cy,
            bounds.width(),
            bounds.height()
        );
        self.view = bounds;
        self.view_applies += 1;
    }

    fn apply_pose(&mut self, target: PoseTarget, pose: Pose) {
        let (roll, pitch, yaw) = pose.orientation.euler_angles();
        info!(
            "{:?} at ({:.3}, {:.3}, {:.3}) rpy ({:.1}, {:.1}, {:.1})",
            target,
            pose.position.x,
            pose.position.y,
            pose.position.z,
            roll.to_degrees(),
            pitch.to_degrees(),
            yaw.to_degrees()
        );
        match target {
            PoseTarget::Camera => {
                self.camera.pose = pose;
                self.camera_applies += 1;
            }
            PoseTarget::FollowedObject => {
                self.followed = pose;
                self.followed_applies += 1;
            }
        }
    }

    fn invoke_hotkey(&mut self, event: &HotkeyEvent) -> InjectionOutcome {
        info!(
            "Hotkey button {} {:?}: {}",
            event.button, event.phase, event.action
        );
        self.hotkeys.push(event.clone());
        InjectionOutcome::Delivered
    }
}
