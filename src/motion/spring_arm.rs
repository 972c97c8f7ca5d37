//! Spring-arm follow mode
//!
//! The followed object sits `distance` units in front of the anchor (the
//! viewport camera) at the anchor's height, and is turned about world up so
//! its +Z faces the anchor. SpaceMouse rotation accumulates into a held
//! rotation expressed relative to that yaw basis, so the user's twist stays
//! put while the anchor looks around.

use super::pose::{compose_rotation, rotation_deg};
use super::{HostFrame, Mode, MotionController, Pose, PoseUpdate};
use crate::config::{self, AxisToken, ConfigError, SpringArmConfig};
use crate::device::sample::AxisSet;
use nalgebra::{UnitQuaternion, Vector3};
use tracing::debug;

/// Rotation deltas below this on every axis leave the held rotation alone
pub const MIN_ROTATION_DEG: f64 = 0.001;
const FLAT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct SpringArmSettings {
    pub pitch: AxisToken,
    pub yaw: AxisToken,
    pub roll: AxisToken,
    pub rotate_speed: f64,
    pub distance: f64,
    pub pitch_multiplier: f64,
    pub yaw_multiplier: f64,
    pub roll_multiplier: f64,
}

impl SpringArmSettings {
    pub fn from_config(config: &SpringArmConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            pitch: AxisToken::parse("spring_arm.pitch", &config.pitch)?,
            yaw: AxisToken::parse("spring_arm.yaw", &config.yaw)?,
            roll: AxisToken::parse("spring_arm.roll", &config.roll)?,
            rotate_speed: config::finite("spring_arm.rotate_speed", config.rotate_speed)?,
            distance: config::positive("spring_arm.distance", config.distance)?,
            pitch_multiplier: config::multiplier(
                "spring_arm.multipliers.pitch",
                config.multipliers.pitch,
            )?,
            yaw_multiplier: config::multiplier("spring_arm.multipliers.yaw", config.multipliers.yaw)?,
            roll_multiplier: config::multiplier(
                "spring_arm.multipliers.roll",
                config.multipliers.roll,
            )?,
        })
    }
}

pub struct SpringArmController {
    settings: SpringArmSettings,
    held: UnitQuaternion<f64>,
    last_yaw_deg: f64,
}

impl SpringArmController {
    pub fn new(settings: SpringArmSettings) -> Self {
        Self {
            settings,
            held: UnitQuaternion::identity(),
            last_yaw_deg: 0.0,
        }
    }

    pub fn settings(&self) -> &SpringArmSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SpringArmSettings) {
        self.settings = settings;
    }

    pub fn held_rotation(&self) -> UnitQuaternion<f64> {
        self.held
    }

    pub fn reset_held_rotation(&mut self) {
        debug!("Spring-arm held rotation reset");
        self.held = UnitQuaternion::identity();
    }

    /// Places the object relative to `anchor`, folding in this tick's rotation
    pub fn follow(&mut self, anchor: &Pose, axes: &AxisSet<f32>, steps: u32) -> Pose {
        let forward = anchor.forward();
        let flat = Vector3::new(forward.x, 0.0, forward.z);
        let flat_norm = flat.norm();

        let (direction, yaw_deg) = if flat_norm < FLAT_EPSILON {
            // Looking straight up or down: keep the previous heading.
            (Vector3::new(0.0, 0.0, -1.0), self.last_yaw_deg)
        } else {
            let direction = flat / flat_norm;
            let yaw_deg = (-direction.x).atan2(-direction.z).to_degrees();
            self.last_yaw_deg = yaw_deg;
            (direction, yaw_deg)
        };

        let position = Vector3::new(
            anchor.position.x + direction.x * self.settings.distance,
            anchor.position.y,
            anchor.position.z + direction.z * self.settings.distance,
        );

        let yaw_basis = rotation_deg(&Vector3::y(), yaw_deg);
        if let Some(delta_world) = self.rotation_delta(anchor, axes, steps) {
            let local = yaw_basis.inverse() * delta_world * yaw_basis;
            let mut held = local * self.held;
            held.renormalize();
            self.held = held;
        }

        let mut orientation = yaw_basis * self.held;
        orientation.renormalize();
        Pose::new(position, orientation)
    }

    /// Anchor-relative rotation for this tick, `None` when negligible
    fn rotation_delta(
        &self,
        anchor: &Pose,
        axes: &AxisSet<f32>,
        steps: u32,
    ) -> Option<UnitQuaternion<f64>> {
        let s = &self.settings;
        let scale = s.rotate_speed * f64::from(steps);
        let pitch = f64::from(s.pitch.read(axes)) * scale * s.pitch_multiplier;
        let yaw = f64::from(s.yaw.read(axes)) * scale * s.yaw_multiplier;
        let roll = f64::from(s.roll.read(axes)) * scale * s.roll_multiplier;

        if pitch.abs() < MIN_ROTATION_DEG && yaw.abs() < MIN_ROTATION_DEG && roll.abs() < MIN_ROTATION_DEG
        {
            return None;
        }

        Some(compose_rotation(
            &anchor.right(),
            &anchor.up(),
            &anchor.forward(),
            pitch,
            yaw,
            roll,
        ))
    }
}

impl MotionController for SpringArmController {
    fn mode(&self) -> Mode {
        Mode::SpringArm
    }

    fn update(&mut self, axes: &AxisSet<f32>, steps: u32, frame: &HostFrame) -> Option<PoseUpdate> {
        let anchor = frame.anchor?;
        Some(PoseUpdate::FollowedObject(self.follow(&anchor, axes, steps)))
    }

    fn reset(&mut self) {
        self.reset_held_rotation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> SpringArmController {
        SpringArmController::new(SpringArmSettings::from_config(&SpringArmConfig::default()).unwrap())
    }

    fn anchor_facing(yaw_deg: f64) -> Pose {
        Pose::new(Vector3::new(1.0, 2.0, 3.0), rotation_deg(&Vector3::y(), yaw_deg))
    }

    #[test]
    fn object_trails_in_front_and_faces_anchor() {
        let mut arm = controller();
        let anchor = anchor_facing(90.0);
        let pose = arm.follow(&anchor, &AxisSet::default(), 0);

        // Facing world -x, ten units ahead at the same height.
        assert!((pose.position - Vector3::new(-9.0, 2.0, 3.0)).norm() < 1e-9);
        let object_z = pose.orientation * Vector3::z();
        let to_anchor = (anchor.position - pose.position).normalize();
        assert!((object_z - to_anchor).norm() < 1e-9);
    }

    #[test]
    fn pitch_of_anchor_does_not_lift_object() {
        let mut arm = controller();
        let tilted = Pose::new(
            Vector3::zeros(),
            rotation_deg(&Vector3::y(), 30.0) * rotation_deg(&Vector3::x(), 40.0),
        );
        let pose = arm.follow(&tilted, &AxisSet::default(), 0);
        assert!(pose.position.y.abs() < 1e-9);
        assert!((pose.position.norm() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn straight_down_reuses_last_heading() {
        let mut arm = controller();
        arm.follow(&anchor_facing(45.0), &AxisSet::default(), 0);
        let down = Pose::new(Vector3::zeros(), rotation_deg(&Vector3::x(), -90.0));
        let pose = arm.follow(&down, &AxisSet::default(), 0);

        assert!((pose.position - Vector3::new(0.0, 0.0, -10.0)).norm() < 1e-9);
        assert!(pose.orientation.angle_to(&rotation_deg(&Vector3::y(), 45.0)) < 1e-9);
    }

    #[test]
    fn held_rotation_accumulates_and_resets() {
        let mut arm = controller();
        let anchor = anchor_facing(0.0);
        let pitch = AxisSet::from_array([0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

        arm.follow(&anchor, &pitch, 2);
        // 1.0 * 5.0 * 2 degrees about the anchor's right axis
        let expected = rotation_deg(&Vector3::x(), 10.0);
        assert!(arm.held_rotation().angle_to(&expected) < 1e-9);

        arm.follow(&anchor, &AxisSet::default(), 0);
        assert!(arm.held_rotation().angle_to(&expected) < 1e-9);

        arm.reset();
        assert_eq!(arm.held_rotation(), UnitQuaternion::identity());
    }

    #[test]
    fn held_rotation_is_relative_to_heading() {
        let mut arm = controller();
        let yaw_input = AxisSet::from_array([0.0, 0.0, 0.0, 0.0, 0.0, -2.0]);
        // Default yaw token is -rz: 2.0 * 5.0 = 10 degrees about world up.
        let pose = arm.follow(&anchor_facing(90.0), &yaw_input, 1);
        assert!(arm.held_rotation().angle_to(&rotation_deg(&Vector3::y(), 10.0)) < 1e-9);
        assert!(pose.orientation.angle_to(&rotation_deg(&Vector3::y(), 100.0)) < 1e-9);
    }

    #[test]
    fn negligible_input_is_ignored() {
        let mut arm = controller();
        let tiny = AxisSet::from_array([0.0, 0.0, 0.0, 0.0001, 0.0, 0.0]);
        arm.follow(&anchor_facing(0.0), &tiny, 1);
        assert_eq!(arm.held_rotation(), UnitQuaternion::identity());
    }

    #[test]
    fn distance_must_be_positive() {
        let config = SpringArmConfig {
            distance: 0.0,
            ..SpringArmConfig::default()
        };
        assert!(matches!(
            SpringArmSettings::from_config(&config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
