//! Motion sample types shared by the decoder, the filter and the wire codec.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// One of the six device axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
}

impl Axis {
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::Rx, Axis::Ry, Axis::Rz];

    pub fn name(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
            Axis::Rx => "rx",
            Axis::Ry => "ry",
            Axis::Rz => "rz",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            "rx" => Ok(Axis::Rx),
            "ry" => Ok(Axis::Ry),
            "rz" => Ok(Axis::Rz),
            other => Err(format!("unknown axis '{}'", other)),
        }
    }
}

/// Six values indexed by [`Axis`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisSet<T> {
    pub x: T,
    pub y: T,
    pub z: T,
    pub rx: T,
    pub ry: T,
    pub rz: T,
}

impl<T: Copy> AxisSet<T> {
    pub fn splat(value: T) -> Self {
        Self::from_array([value; 6])
    }

    pub fn from_array(values: [T; 6]) -> Self {
        let [x, y, z, rx, ry, rz] = values;
        Self {
            x,
            y,
            z,
            rx,
            ry,
            rz,
        }
    }

    pub fn to_array(&self) -> [T; 6] {
        [self.x, self.y, self.z, self.rx, self.ry, self.rz]
    }

    pub fn map<U: Copy>(&self, f: impl Fn(Axis, T) -> U) -> AxisSet<U> {
        let values = self.to_array();
        AxisSet::from_array(std::array::from_fn(|i| f(Axis::ALL[i], values[i])))
    }
}

impl<T> Index<Axis> for AxisSet<T> {
    type Output = T;

    fn index(&self, axis: Axis) -> &T {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
            Axis::Rx => &self.rx,
            Axis::Ry => &self.ry,
            Axis::Rz => &self.rz,
        }
    }
}

impl<T> IndexMut<Axis> for AxisSet<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
            Axis::Rx => &mut self.rx,
            Axis::Ry => &mut self.ry,
            Axis::Rz => &mut self.rz,
        }
    }
}

impl AxisSet<f32> {
    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|v| *v == 0.0)
    }
}

/// Decoded device state in raw device units
///
/// Produced once per decoded report and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionSample {
    pub axes: AxisSet<i16>,
    pub buttons: u32,
    pub sequence: u32,
}

/// A [`MotionSample`] after deadzone suppression and per-axis scaling
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilteredSample {
    pub axes: AxisSet<f32>,
    pub buttons: u32,
    pub sequence: u32,
}

impl FilteredSample {
    pub fn is_at_rest(&self) -> bool {
        self.axes.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_parsing_accepts_known_names() {
        assert_eq!("RX".parse::<Axis>(), Ok(Axis::Rx));
        assert_eq!(" z ".parse::<Axis>(), Ok(Axis::Z));
        assert!("w".parse::<Axis>().is_err());
    }

    #[test]
    fn index_matches_named_fields() {
        let mut set = AxisSet::from_array([1, 2, 3, 4, 5, 6]);
        assert_eq!(set[Axis::Ry], 5);
        set[Axis::X] = 10;
        assert_eq!(set.x, 10);
        assert_eq!(Axis::Rz.index(), 5);
    }
}
