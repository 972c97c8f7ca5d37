//! Pose types and rotation helpers
//!
//! Conventions: right-handed, Y up. A camera looks down its local -Z axis,
//! +X is right and +Y is up.

use nalgebra::{Unit, UnitQuaternion, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// World-space direction the pose looks at (local -Z)
    pub fn forward(&self) -> Vector3<f64> {
        self.orientation * -Vector3::z()
    }

    pub fn right(&self) -> Vector3<f64> {
        self.orientation * Vector3::x()
    }

    pub fn up(&self) -> Vector3<f64> {
        self.orientation * Vector3::y()
    }

    /// True when position and orientation match within `tolerance`
    pub fn approx_eq(&self, other: &Pose, tolerance: f64) -> bool {
        (self.position - other.position).amax() <= tolerance
            && self.orientation.angle_to(&other.orientation) <= tolerance
    }
}

/// A viewport camera orbiting around a pivot point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub pose: Pose,
    pub pivot: Vector3<f64>,
}

/// Visible region of a 2D canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ViewBounds {
    pub fn from_center(center_x: f64, center_y: f64, width: f64, height: f64) -> Self {
        Self {
            min_x: center_x - width / 2.0,
            min_y: center_y - height / 2.0,
            max_x: center_x + width / 2.0,
            max_y: center_y + height / 2.0,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn approx_eq(&self, other: &ViewBounds, tolerance: f64) -> bool {
        (self.min_x - other.min_x).abs() <= tolerance
            && (self.min_y - other.min_y).abs() <= tolerance
            && (self.max_x - other.max_x).abs() <= tolerance
            && (self.max_y - other.max_y).abs() <= tolerance
    }
}

/// Rotation of `degrees` about `axis`; a degenerate axis yields identity
pub fn rotation_deg(axis: &Vector3<f64>, degrees: f64) -> UnitQuaternion<f64> {
    match Unit::try_new(*axis, 1e-12) {
        Some(axis) => UnitQuaternion::from_axis_angle(&axis, degrees.to_radians()),
        None => UnitQuaternion::identity(),
    }
}

/// Composes `roll · pitch · yaw` about the given axes and renormalizes
pub fn compose_rotation(
    right: &Vector3<f64>,
    up: &Vector3<f64>,
    forward: &Vector3<f64>,
    pitch_deg: f64,
    yaw_deg: f64,
    roll_deg: f64,
) -> UnitQuaternion<f64> {
    let mut delta =
        rotation_deg(forward, roll_deg) * rotation_deg(right, pitch_deg) * rotation_deg(up, yaw_deg);
    delta.renormalize();
    delta
}
