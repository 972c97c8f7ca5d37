use super::camera::CameraSettings;
use super::{CameraRig, HostFrame, Mode, MotionController, Pose, PoseUpdate};
use crate::device::sample::AxisSet;

/// Swings the viewport camera around its pivot
///
/// The camera's offset from the pivot is kept in camera-local coordinates,
/// so translation dollies and trucks relative to what the user sees and
/// rotation orbits without drifting the pivot.
pub struct OrbitController {
    settings: CameraSettings,
}

impl OrbitController {
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: CameraSettings) {
        self.settings = settings;
    }

    pub fn step(&self, rig: &CameraRig, axes: &AxisSet<f32>, steps: u32) -> Option<Pose> {
        let delta = self.settings.delta(axes, steps)?;
        let orientation = rig.pose.orientation;

        let offset = orientation.inverse() * (rig.pose.position - rig.pivot) + delta.translation;
        let mut next = orientation * delta.rotation;
        next.renormalize();

        Some(Pose::new(rig.pivot + next * offset, next))
    }
}

impl MotionController for OrbitController {
    fn mode(&self) -> Mode {
        Mode::Orbit
    }

    fn update(&mut self, axes: &AxisSet<f32>, steps: u32, frame: &HostFrame) -> Option<PoseUpdate> {
        let rig = frame.camera?;
        self.step(&rig, axes, steps).map(PoseUpdate::Camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewportConfig;
    use crate::motion::pose::rotation_deg;
    use nalgebra::{UnitQuaternion, Vector3};

    fn controller(rotate_speed: f64) -> OrbitController {
        let config = ViewportConfig {
            rotate_speed,
            ..ViewportConfig::default()
        };
        OrbitController::new(CameraSettings::from_config("orbit", &config).unwrap())
    }

    fn yaw(amount: f32) -> AxisSet<f32> {
        AxisSet::from_array([0.0, 0.0, 0.0, 0.0, amount, 0.0])
    }

    #[test]
    fn yaw_orbits_around_pivot_and_keeps_looking_at_it() {
        let rig = CameraRig {
            pose: Pose::new(Vector3::new(0.0, 0.0, 10.0), UnitQuaternion::identity()),
            pivot: Vector3::zeros(),
        };
        let next = controller(180.0).step(&rig, &yaw(1.0), 1).unwrap();

        assert!((next.position - Vector3::new(10.0, 0.0, 0.0)).norm() < 1e-9);
        let to_pivot = (rig.pivot - next.position).normalize();
        assert!((next.forward() - to_pivot).norm() < 1e-9);
    }

    #[test]
    fn rotation_is_relative_to_current_facing() {
        let orbit = controller(40.0);
        let input = AxisSet::from_array([0.0, 0.0, 0.0, 0.3, 0.7, -0.2]);

        for start in [
            rotation_deg(&Vector3::y(), 35.0),
            rotation_deg(&Vector3::new(1.0, 1.0, 0.0), -120.0),
        ] {
            let rig = CameraRig {
                pose: Pose::new(start * Vector3::new(0.0, 0.0, 5.0), start),
                pivot: Vector3::zeros(),
            };
            let next = orbit.step(&rig, &input, 1).unwrap();
            let relative = start.inverse() * next.orientation;
            let expected = orbit.settings().delta(&input, 1).unwrap().rotation;
            assert!(relative.angle_to(&expected) < 1e-9);
            assert!((next.position.norm() - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn forward_translation_dollies_toward_pivot() {
        let rig = CameraRig {
            pose: Pose::new(Vector3::new(0.0, 0.0, 10.0), UnitQuaternion::identity()),
            pivot: Vector3::zeros(),
        };
        let input = AxisSet::from_array([0.0, 0.0, -2.0, 0.0, 0.0, 0.0]);
        let next = controller(0.3).step(&rig, &input, 1).unwrap();
        // -2 * 0.5 * 0.1 along local z
        assert!((next.position - Vector3::new(0.0, 0.0, 9.9)).norm() < 1e-9);
    }
}
