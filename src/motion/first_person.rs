use super::camera::CameraSettings;
use super::{HostFrame, Mode, MotionController, Pose, PoseUpdate};
use crate::device::sample::AxisSet;

/// Flies the viewport camera: rotate in place, move along the new facing
pub struct FirstPersonController {
    settings: CameraSettings,
}

impl FirstPersonController {
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: CameraSettings) {
        self.settings = settings;
    }

    pub fn step(&self, pose: &Pose, axes: &AxisSet<f32>, steps: u32) -> Option<Pose> {
        let delta = self.settings.delta(axes, steps)?;
        let mut next = pose.orientation * delta.rotation;
        next.renormalize();

        Some(Pose::new(pose.position + next * delta.translation, next))
    }
}

impl MotionController for FirstPersonController {
    fn mode(&self) -> Mode {
        Mode::FirstPerson
    }

    fn update(&mut self, axes: &AxisSet<f32>, steps: u32, frame: &HostFrame) -> Option<PoseUpdate> {
        let rig = frame.camera?;
        self.step(&rig.pose, axes, steps).map(PoseUpdate::Camera)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewportConfig;
    use crate::motion::pose::rotation_deg;
    use nalgebra::{UnitQuaternion, Vector3};

    fn controller() -> FirstPersonController {
        let config = ViewportConfig {
            rotate_speed: 180.0,
            ..ViewportConfig::default()
        };
        FirstPersonController::new(CameraSettings::from_config("first_person", &config).unwrap())
    }

    #[test]
    fn pure_rotation_keeps_position() {
        let pose = Pose::new(Vector3::new(1.0, 2.0, 3.0), UnitQuaternion::identity());
        let input = AxisSet::from_array([0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let next = controller().step(&pose, &input, 1).unwrap();
        assert_eq!(next.position, pose.position);
        assert!(next.orientation.angle_to(&rotation_deg(&Vector3::y(), 90.0)) < 1e-9);
    }

    #[test]
    fn translation_follows_camera_facing() {
        let facing_left = rotation_deg(&Vector3::y(), 90.0);
        let pose = Pose::new(Vector3::zeros(), facing_left);
        // Local -z is forward; the camera faces world -x.
        let input = AxisSet::from_array([0.0, 0.0, -1.0, 0.0, 0.0, 0.0]);
        let next = controller().step(&pose, &input, 2).unwrap();
        assert!((next.position - Vector3::new(-0.1, 0.0, 0.0)).norm() < 1e-9);
    }
}
