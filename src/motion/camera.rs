//! Camera-local deltas shared by orbit and first-person navigation

use super::pose::compose_rotation;
use crate::config::{self, AxisToken, ConfigError, ViewportConfig};
use crate::device::sample::AxisSet;
use nalgebra::{UnitQuaternion, Vector3};

const TRANSLATE_SCALE: f64 = 0.1;
const ROTATE_SCALE_DEG: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    /// Translation tokens for local x, y and z
    pub translate: [AxisToken; 3],
    /// Rotation tokens for pitch (x), yaw (y) and roll (z)
    pub rotate: [AxisToken; 3],
    pub translate_speed: f64,
    pub rotate_speed: f64,
    pub translate_multipliers: [f64; 3],
    pub rotate_multipliers: [f64; 3],
}

impl CameraSettings {
    /// `section` names the config table in error messages (`orbit`, `first_person`)
    pub fn from_config(section: &str, config: &ViewportConfig) -> Result<Self, ConfigError> {
        let token = |key: &str, value: &str| AxisToken::parse(&format!("{}.{}", section, key), value);
        let mult = |key: &str, value: f64| {
            config::multiplier(&format!("{}.multipliers.{}", section, key), value)
        };
        let m = &config.multipliers;

        Ok(Self {
            translate: [
                token("translate_x", &config.translate_x)?,
                token("translate_y", &config.translate_y)?,
                token("translate_z", &config.translate_z)?,
            ],
            rotate: [
                token("rotate_x", &config.rotate_x)?,
                token("rotate_y", &config.rotate_y)?,
                token("rotate_z", &config.rotate_z)?,
            ],
            translate_speed: config::finite(
                &format!("{}.translate_speed", section),
                config.translate_speed,
            )?,
            rotate_speed: config::finite(&format!("{}.rotate_speed", section), config.rotate_speed)?,
            translate_multipliers: [
                mult("translate_x", m.translate_x)?,
                mult("translate_y", m.translate_y)?,
                mult("translate_z", m.translate_z)?,
            ],
            rotate_multipliers: [
                mult("rotate_x", m.rotate_x)?,
                mult("rotate_y", m.rotate_y)?,
                mult("rotate_z", m.rotate_z)?,
            ],
        })
    }

    /// Camera-local translation and rotation for one dispatch
    ///
    /// `None` when every mapped input is zero.
    pub fn delta(&self, axes: &AxisSet<f32>, steps: u32) -> Option<CameraDelta> {
        let read = |tokens: &[AxisToken; 3]| tokens.map(|t| f64::from(t.read(axes)));
        let t = read(&self.translate);
        let r = read(&self.rotate);
        if t.iter().chain(r.iter()).all(|v| *v == 0.0) {
            return None;
        }

        let steps = f64::from(steps);
        let translate = self.translate_speed * TRANSLATE_SCALE * steps;
        let rotate = self.rotate_speed * ROTATE_SCALE_DEG * steps;
        let tm = &self.translate_multipliers;
        let rm = &self.rotate_multipliers;

        let translation = Vector3::new(
            t[0] * translate * tm[0],
            t[1] * translate * tm[1],
            t[2] * translate * tm[2],
        );
        let rotation = compose_rotation(
            &Vector3::x(),
            &Vector3::y(),
            &-Vector3::z(),
            r[0] * rotate * rm[0],
            r[1] * rotate * rm[1],
            r[2] * rotate * rm[2],
        );
        Some(CameraDelta {
            translation,
            rotation,
        })
    }
}

/// Motion expressed in the camera's own frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraDelta {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_scales_with_speed_and_steps() {
        let settings = CameraSettings::from_config("orbit", &ViewportConfig::default()).unwrap();
        let axes = AxisSet::from_array([1.0, 0.0, -2.0, 0.0, 0.0, 0.0]);
        let delta = settings.delta(&axes, 4).unwrap();
        // 0.5 * 0.1 * 4 = 0.2 per unit
        assert!((delta.translation - Vector3::new(0.2, 0.0, -0.4)).norm() < 1e-9);
        assert!(delta.rotation.angle() < 1e-12);
    }

    #[test]
    fn pitch_rotates_about_local_x() {
        let config = ViewportConfig {
            rotate_speed: 180.0,
            ..ViewportConfig::default()
        };
        let settings = CameraSettings::from_config("first_person", &config).unwrap();
        let axes = AxisSet::from_array([0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let delta = settings.delta(&axes, 1).unwrap();
        // 180 * 0.5 = 90 degrees about +X tips the view up
        let forward = delta.rotation * -Vector3::z();
        assert!((forward - Vector3::y()).norm() < 1e-9);
    }

    #[test]
    fn unmapped_input_is_ignored() {
        let config = ViewportConfig {
            translate_x: "none".to_string(),
            ..ViewportConfig::default()
        };
        let settings = CameraSettings::from_config("orbit", &config).unwrap();
        let axes = AxisSet::from_array([5.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(settings.delta(&axes, 1).is_none());
    }

    #[test]
    fn errors_name_the_section() {
        let config = ViewportConfig {
            rotate_z: "roll".to_string(),
            ..ViewportConfig::default()
        };
        let err = CameraSettings::from_config("first_person", &config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAxisToken { ref field, .. } if field == "first_person.rotate_z"));
    }
}
