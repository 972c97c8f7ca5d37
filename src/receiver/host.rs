//! Boundary between the receiver and the application it drives
//!
//! Reads are snapshots taken once per tick. Writes are only issued when a
//! controller produced a pose that differs from the last one applied.

use crate::hotkey::{HotkeyEvent, InjectionOutcome};
use crate::motion::{CameraRig, Pose, ViewBounds};

/// What kind of pane the pointer is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneKind {
    /// 2D node graph or canvas
    NodeCanvas,
    /// 3D viewport
    Viewport,
    Other,
}

/// Target of a 3D pose write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseTarget {
    Camera,
    FollowedObject,
}

pub trait Host {
    /// Current bounds of the 2D canvas pan/zoom acts on
    fn view_bounds(&self) -> Option<ViewBounds>;

    /// Viewport camera and its orbit pivot
    fn camera_rig(&self) -> Option<CameraRig>;

    /// Pose the spring-arm object follows, normally the viewport camera
    fn anchor_pose(&self) -> Option<Pose> {
        self.camera_rig().map(|rig| rig.pose)
    }

    fn pane_under_pointer(&self) -> Option<PaneKind> {
        None
    }

    fn apply_view_bounds(&mut self, bounds: ViewBounds);

    /// Writes translation and rotation only; the target keeps its own scale
    fn apply_pose(&mut self, target: PoseTarget, pose: Pose);

    /// Hands a hotkey event to the host; the receiver never synthesizes input
    fn invoke_hotkey(&mut self, _event: &HotkeyEvent) -> InjectionOutcome {
        InjectionOutcome::Unknown
    }
}
