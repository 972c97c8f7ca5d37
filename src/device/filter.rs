//! Deadzone suppression and per-axis scaling

use super::sample::{AxisSet, FilteredSample, MotionSample};

/// Deadzone in raw device units for every axis
pub const DEFAULT_DEADZONE: u16 = 15;

/// Raw units per output unit when no explicit multipliers are configured
pub const DEFAULT_SCALE: f32 = 350.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    pub deadzone: AxisSet<u16>,
    pub multiplier: AxisSet<f32>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            deadzone: AxisSet::splat(DEFAULT_DEADZONE),
            multiplier: AxisSet::splat(1.0 / DEFAULT_SCALE),
        }
    }
}

impl FilterSettings {
    pub fn apply(&self, sample: &MotionSample) -> FilteredSample {
        filter(sample, &self.deadzone, &self.multiplier)
    }
}

/// Zeroes every axis whose magnitude is below its deadzone and scales the rest.
///
/// Buttons and sequence pass through untouched.
pub fn filter(
    sample: &MotionSample,
    deadzone: &AxisSet<u16>,
    multiplier: &AxisSet<f32>,
) -> FilteredSample {
    let axes = sample.axes.map(|axis, value| {
        if i32::from(value).abs() < i32::from(deadzone[axis]) {
            0.0
        } else {
            f32::from(value) * multiplier[axis]
        }
    });

    FilteredSample {
        axes,
        buttons: sample.buttons,
        sequence: sample.sequence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sample::Axis;

    #[test]
    fn values_inside_deadzone_are_exactly_zero() {
        let sample = MotionSample {
            axes: AxisSet::from_array([14, -14, 15, -15, 0, i16::MIN]),
            buttons: 0b101,
            sequence: 7,
        };
        let out = FilterSettings::default().apply(&sample);

        assert_eq!(out.axes.x, 0.0);
        assert_eq!(out.axes.y, 0.0);
        assert_eq!(out.axes.z, 15.0 * (1.0 / DEFAULT_SCALE));
        assert_eq!(out.axes.rx, -15.0 * (1.0 / DEFAULT_SCALE));
        assert_eq!(out.axes.ry, 0.0);
        assert_eq!(out.axes.rz, f32::from(i16::MIN) * (1.0 / DEFAULT_SCALE));
        assert_eq!(out.buttons, 0b101);
        assert_eq!(out.sequence, 7);
    }

    #[test]
    fn per_axis_settings_are_independent() {
        let mut settings = FilterSettings {
            deadzone: AxisSet::splat(0),
            multiplier: AxisSet::splat(1.0),
        };
        settings.deadzone[Axis::Rz] = 100;
        settings.multiplier[Axis::X] = -2.0;

        let sample = MotionSample {
            axes: AxisSet::from_array([10, 10, 10, 10, 10, 99]),
            ..Default::default()
        };
        let out = settings.apply(&sample);
        assert_eq!(out.axes.to_array(), [-20.0, 10.0, 10.0, 10.0, 10.0, 0.0]);
    }
}
