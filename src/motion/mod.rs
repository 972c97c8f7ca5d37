//! Motion controllers
//!
//! Each mode turns the latest filtered axes into a new pose for one host
//! target. Controllers never read host state themselves: the receiver hands
//! them a [`HostFrame`] and applies whatever [`PoseUpdate`] comes back.
//!
//! ```text
//! Pan          2D canvas bounds      pan + zoom
//! Orbit        viewport camera       camera-local move, swing around pivot
//! FirstPerson  viewport camera       camera-local move, rotate in place
//! SpringArm    followed object       trail the anchor, face it, add user twist
//! ```

pub mod camera;
pub mod first_person;
pub mod orbit;
pub mod pan_zoom;
pub mod pose;
pub mod spring_arm;

pub use camera::CameraSettings;
pub use first_person::FirstPersonController;
pub use orbit::OrbitController;
pub use pan_zoom::{PanZoomController, PanZoomSettings};
pub use pose::{CameraRig, Pose, ViewBounds};
pub use spring_arm::{SpringArmController, SpringArmSettings};

use crate::config::{BridgeConfig, ConfigError};
use crate::device::sample::AxisSet;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Pan,
    Orbit,
    FirstPerson,
    SpringArm,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Pan, Mode::Orbit, Mode::FirstPerson, Mode::SpringArm];

    pub fn name(self) -> &'static str {
        match self {
            Mode::Pan => "pan",
            Mode::Orbit => "orbit",
            Mode::FirstPerson => "first_person",
            Mode::SpringArm => "spring_arm",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Host state visible to a controller for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HostFrame {
    pub view: Option<ViewBounds>,
    pub camera: Option<CameraRig>,
    pub anchor: Option<Pose>,
}

/// Where a controller's output goes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseUpdate {
    View(ViewBounds),
    Camera(Pose),
    FollowedObject(Pose),
}

pub trait MotionController: Send {
    fn mode(&self) -> Mode;

    /// Computes the next pose from the latest axes
    ///
    /// `steps` is the number of datagrams the axes stand for; deltas scale
    /// with it so a slow host tick does not slow down motion. Returns `None`
    /// when there is nothing to change or the needed host state is missing.
    fn update(&mut self, axes: &AxisSet<f32>, steps: u32, frame: &HostFrame) -> Option<PoseUpdate>;

    /// Clears any state the controller accumulates
    fn reset(&mut self) {}
}

/// One controller instance per mode, owned by a single receiver
pub struct ControllerSet {
    pan: PanZoomController,
    orbit: OrbitController,
    first_person: FirstPersonController,
    spring_arm: SpringArmController,
}

impl ControllerSet {
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            pan: PanZoomController::new(PanZoomSettings::from_config(&config.pan)?),
            orbit: OrbitController::new(CameraSettings::from_config("orbit", &config.orbit)?),
            first_person: FirstPersonController::new(CameraSettings::from_config(
                "first_person",
                &config.first_person,
            )?),
            spring_arm: SpringArmController::new(SpringArmSettings::from_config(
                &config.spring_arm,
            )?),
        })
    }

    pub fn get_mut(&mut self, mode: Mode) -> &mut dyn MotionController {
        match mode {
            Mode::Pan => &mut self.pan,
            Mode::Orbit => &mut self.orbit,
            Mode::FirstPerson => &mut self.first_person,
            Mode::SpringArm => &mut self.spring_arm,
        }
    }

    pub fn spring_arm(&self) -> &SpringArmController {
        &self.spring_arm
    }

    pub fn spring_arm_mut(&mut self) -> &mut SpringArmController {
        &mut self.spring_arm
    }

    /// Replaces settings on every controller, or none of them if any is invalid
    ///
    /// Accumulated state such as the spring-arm held rotation survives.
    pub fn reload(&mut self, config: &BridgeConfig) -> Result<(), ConfigError> {
        let pan = PanZoomSettings::from_config(&config.pan)?;
        let orbit = CameraSettings::from_config("orbit", &config.orbit)?;
        let first_person = CameraSettings::from_config("first_person", &config.first_person)?;
        let spring_arm = SpringArmSettings::from_config(&config.spring_arm)?;

        self.pan.set_settings(pan);
        self.orbit.set_settings(orbit);
        self.first_person.set_settings(first_person);
        self.spring_arm.set_settings(spring_arm);
        Ok(())
    }
}
