//! Bridge configuration
//!
//! Loaded from `~/.config/spacebridge/config.toml`. Every key is optional;
//! validation resolves axis tokens, multipliers and hotkey combos up front so
//! a bad file is rejected at load time instead of misbehaving at run time.

pub mod axis;

pub use axis::AxisToken;

use crate::device::filter::{FilterSettings, DEFAULT_DEADZONE, DEFAULT_SCALE};
use crate::device::sample::AxisSet;
use crate::hotkey::HotkeyBinding;
use crate::motion::{CameraSettings, Mode, PanZoomSettings, SpringArmSettings};
use crate::transport::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = ".config/spacebridge";
const CONFIG_FILE: &str = "config.toml";

/// Largest accepted magnitude for any multiplier
pub const MAX_MULTIPLIER: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid axis token '{token}' for {field}")]
    InvalidAxisToken { field: String, token: String },

    #[error("Multiplier {field} = {value} is out of range (finite, |m| <= 100)")]
    MultiplierOutOfRange { field: String, value: f64 },

    #[error("Invalid hotkey '{combo}' for {field}: {reason}")]
    InvalidHotkey {
        field: String,
        combo: String,
        reason: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Config I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mode: Mode,
    pub transport: TransportConfig,
    pub device: DeviceConfig,
    pub pan: PanConfig,
    pub orbit: ViewportConfig,
    pub first_person: ViewportConfig,
    pub spring_arm: SpringArmConfig,
    pub auto_mode_switch: AutoModeSwitchConfig,
    pub receiver: ReceiverConfig,
    pub hotkeys: HotkeyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub port: u16,
    pub poll_rate_hz: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            poll_rate_hz: 60,
        }
    }
}

/// One value for every axis, or six individual values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerAxis<T> {
    Uniform(T),
    Each([T; 6]),
}

impl<T: Copy> PerAxis<T> {
    pub fn to_axis_set(&self) -> AxisSet<T> {
        match self {
            PerAxis::Uniform(value) => AxisSet::splat(*value),
            PerAxis::Each(values) => AxisSet::from_array(*values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Raw device units
    pub deadzone: PerAxis<u16>,
    /// Raw units per output unit, used when `multipliers` is absent
    pub scale: f32,
    pub multipliers: Option<[f32; 6]>,
    pub read_timeout_ms: u64,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            deadzone: PerAxis::Uniform(DEFAULT_DEADZONE),
            scale: DEFAULT_SCALE,
            multipliers: None,
            read_timeout_ms: 8,
            reconnect_attempts: 5,
            reconnect_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanPreset {
    /// Translation cap pans, push/pull zooms
    Translate,
    /// Tilting the cap pans
    Rotate,
    /// Use the three axis tokens as written
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanConfig {
    /// `translate` and `rotate` override the three axis tokens
    pub preset: Option<PanPreset>,
    pub pan_horizontal: String,
    pub pan_vertical: String,
    pub zoom: String,
    pub pan_speed: f64,
    pub zoom_speed: f64,
    pub multipliers: PanMultipliers,
}

impl Default for PanConfig {
    fn default() -> Self {
        Self {
            preset: None,
            pan_horizontal: "x".to_string(),
            pan_vertical: "-y".to_string(),
            zoom: "z".to_string(),
            pan_speed: 0.03,
            zoom_speed: 0.07,
            multipliers: PanMultipliers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanMultipliers {
    pub pan_horizontal: f64,
    pub pan_vertical: f64,
    pub zoom: f64,
}

impl Default for PanMultipliers {
    fn default() -> Self {
        Self {
            pan_horizontal: 1.0,
            pan_vertical: 1.0,
            zoom: 1.0,
        }
    }
}

/// Camera navigation settings shared by orbit and first-person modes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub translate_x: String,
    pub translate_y: String,
    pub translate_z: String,
    pub rotate_x: String,
    pub rotate_y: String,
    pub rotate_z: String,
    pub translate_speed: f64,
    pub rotate_speed: f64,
    pub multipliers: ViewportMultipliers,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            translate_x: "x".to_string(),
            translate_y: "y".to_string(),
            translate_z: "z".to_string(),
            rotate_x: "rx".to_string(),
            rotate_y: "ry".to_string(),
            rotate_z: "rz".to_string(),
            translate_speed: 0.5,
            rotate_speed: 0.3,
            multipliers: ViewportMultipliers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportMultipliers {
    pub translate_x: f64,
    pub translate_y: f64,
    pub translate_z: f64,
    pub rotate_x: f64,
    pub rotate_y: f64,
    pub rotate_z: f64,
}

impl Default for ViewportMultipliers {
    fn default() -> Self {
        Self {
            translate_x: 1.0,
            translate_y: 1.0,
            translate_z: 1.0,
            rotate_x: 1.0,
            rotate_y: 1.0,
            rotate_z: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringArmConfig {
    pub pitch: String,
    pub yaw: String,
    pub roll: String,
    /// Degrees per output unit per step
    pub rotate_speed: f64,
    pub distance: f64,
    pub multipliers: RotationMultipliers,
}

impl Default for SpringArmConfig {
    fn default() -> Self {
        Self {
            pitch: "rx".to_string(),
            yaw: "-rz".to_string(),
            roll: "-ry".to_string(),
            rotate_speed: 5.0,
            distance: 10.0,
            multipliers: RotationMultipliers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationMultipliers {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Default for RotationMultipliers {
    fn default() -> Self {
        Self {
            pitch: 1.0,
            yaw: 1.0,
            roll: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoModeSwitchConfig {
    pub enabled: bool,
    /// Use pan/zoom whenever the pointer is over a 2D node canvas
    pub pan_under_pointer: bool,
}

impl Default for AutoModeSwitchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pan_under_pointer: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub drain_cap: usize,
    pub tick_hz: u32,
    pub perf_reply_hz: u32,
    pub diagnostics_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            drain_cap: 256,
            tick_hz: 60,
            perf_reply_hz: 10,
            diagnostics_capacity: 32,
        }
    }
}

/// A button binding as written in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingSpec {
    Combo(String),
    Detailed {
        #[serde(default)]
        combo: Option<String>,
        #[serde(default)]
        command: Option<String>,
        #[serde(default)]
        activation: Option<crate::hotkey::Activation>,
    },
}

/// `button_<N> = binding` tables, one per mode
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub pan: BTreeMap<String, BindingSpec>,
    pub orbit: BTreeMap<String, BindingSpec>,
    pub first_person: BTreeMap<String, BindingSpec>,
    pub spring_arm: BTreeMap<String, BindingSpec>,
}

impl HotkeyConfig {
    pub fn for_mode(&self, mode: Mode) -> &BTreeMap<String, BindingSpec> {
        match mode {
            Mode::Pan => &self.pan,
            Mode::Orbit => &self.orbit,
            Mode::FirstPerson => &self.first_person,
            Mode::SpringArm => &self.spring_arm,
        }
    }
}

impl BridgeConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Rejects anything the controllers could not run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("transport.poll_rate_hz", self.transport.poll_rate_hz as f64)?;
        positive("receiver.drain_cap", self.receiver.drain_cap as f64)?;
        positive("receiver.tick_hz", self.receiver.tick_hz as f64)?;
        positive("receiver.perf_reply_hz", self.receiver.perf_reply_hz as f64)?;
        positive(
            "receiver.diagnostics_capacity",
            self.receiver.diagnostics_capacity as f64,
        )?;
        self.filter_settings()?;

        PanZoomSettings::from_config(&self.pan)?;
        CameraSettings::from_config("orbit", &self.orbit)?;
        CameraSettings::from_config("first_person", &self.first_person)?;
        SpringArmSettings::from_config(&self.spring_arm)?;
        for mode in Mode::ALL {
            self.bindings_for(mode)?;
        }

        debug!("Configuration validated");
        Ok(())
    }

    pub fn filter_settings(&self) -> Result<FilterSettings, ConfigError> {
        let multiplier = match self.device.multipliers {
            Some(values) => {
                for (i, value) in values.iter().enumerate() {
                    multiplier(&format!("device.multipliers[{}]", i), f64::from(*value))?;
                }
                AxisSet::from_array(values)
            }
            None => {
                let scale = positive("device.scale", f64::from(self.device.scale))?;
                let derived = multiplier("device.scale", 1.0 / scale)?;
                AxisSet::splat(derived as f32)
            }
        };

        Ok(FilterSettings {
            deadzone: self.device.deadzone.to_axis_set(),
            multiplier,
        })
    }

    /// Resolved hotkey bindings for one mode
    pub fn bindings_for(&self, mode: Mode) -> Result<Vec<HotkeyBinding>, ConfigError> {
        crate::hotkey::resolve_bindings(mode, self.hotkeys.for_mode(mode))
    }

    /// `~/.config/spacebridge/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads the file at `path`, falling back to defaults when it does not exist
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| ConfigError::Io(format!("Failed to check {}: {}", path.display(), e)))?;
        if !exists {
            info!(
                "No config at {}, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {} (mode: {})", path.display(), config.mode);
        Ok(config)
    }

    /// Writes the default configuration unless a file already exists
    ///
    /// Returns whether a file was written.
    pub async fn write_default(path: &Path) -> Result<bool, ConfigError> {
        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| ConfigError::Io(e.to_string()))?
        {
            warn!("Config already exists at {}, leaving it untouched", path.display());
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::Io(format!("Failed to create config directory: {}", e)))?;
        }
        let content = Self::default().to_toml_string()?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ConfigError::Io(format!("Failed to write config file: {}", e)))?;
        info!("Wrote default config to {}", path.display());
        Ok(true)
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

/// Finite and within `±MAX_MULTIPLIER`
pub(crate) fn multiplier(field: &str, value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() || value.abs() > MAX_MULTIPLIER {
        return Err(ConfigError::MultiplierOutOfRange {
            field: field.to_string(),
            value,
        });
    }
    Ok(value)
}

pub(crate) fn finite(field: &str, value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("{} is not finite", value),
        });
    }
    Ok(value)
}

pub(crate) fn positive(field: &str, value: f64) -> Result<f64, ConfigError> {
    if finite(field, value)? <= 0.0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("{} must be greater than zero", value),
        });
    }
    Ok(value)
}
