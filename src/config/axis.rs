use super::ConfigError;
use crate::device::sample::{Axis, AxisSet};
use std::fmt::{self, Display};

/// Reference to a device axis, optionally inverted, or nothing at all
///
/// Written as `x`, `-rz`, `none` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisToken {
    source: Option<Axis>,
    inverted: bool,
}

impl AxisToken {
    pub const NONE: AxisToken = AxisToken {
        source: None,
        inverted: false,
    };

    pub const fn of(axis: Axis) -> Self {
        Self {
            source: Some(axis),
            inverted: false,
        }
    }

    pub const fn inverted(axis: Axis) -> Self {
        Self {
            source: Some(axis),
            inverted: true,
        }
    }

    pub fn parse(field: &str, token: &str) -> Result<Self, ConfigError> {
        let trimmed = token.trim();
        if trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::NONE);
        }

        let (inverted, name) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let axis = name
            .parse::<Axis>()
            .map_err(|_| ConfigError::InvalidAxisToken {
                field: field.to_string(),
                token: token.to_string(),
            })?;

        Ok(Self {
            source: Some(axis),
            inverted,
        })
    }

    /// Reads the referenced axis from a sample, applying inversion
    pub fn read(&self, axes: &AxisSet<f32>) -> f32 {
        match self.source {
            Some(axis) if self.inverted => -axes[axis],
            Some(axis) => axes[axis],
            None => 0.0,
        }
    }
}

impl Display for AxisToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            None => write!(f, "none"),
            Some(axis) if self.inverted => write!(f, "-{}", axis),
            Some(axis) => write!(f, "{}", axis),
        }
    }
}
