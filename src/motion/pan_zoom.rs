use super::{HostFrame, Mode, MotionController, PoseUpdate, ViewBounds};
use crate::config::{self, AxisToken, ConfigError, PanConfig, PanPreset};
use crate::device::sample::{Axis, AxisSet};

/// Zoom input at or below this magnitude is ignored
pub const ZOOM_THRESHOLD: f64 = 0.01;
const MIN_ZOOM_STEP: f64 = 0.95;
const MAX_ZOOM_STEP: f64 = 1.05;

#[derive(Debug, Clone, PartialEq)]
pub struct PanZoomSettings {
    pub horizontal: AxisToken,
    pub vertical: AxisToken,
    pub zoom: AxisToken,
    pub pan_speed: f64,
    pub zoom_speed: f64,
    pub horizontal_multiplier: f64,
    pub vertical_multiplier: f64,
    pub zoom_multiplier: f64,
}

impl PanZoomSettings {
    pub fn from_config(config: &PanConfig) -> Result<Self, ConfigError> {
        let (horizontal, vertical, zoom) = match config.preset {
            Some(PanPreset::Translate) => (
                AxisToken::of(Axis::X),
                AxisToken::inverted(Axis::Y),
                AxisToken::of(Axis::Z),
            ),
            Some(PanPreset::Rotate) => (
                AxisToken::inverted(Axis::Ry),
                AxisToken::inverted(Axis::Rx),
                AxisToken::of(Axis::Z),
            ),
            Some(PanPreset::Custom) | None => (
                AxisToken::parse("pan.pan_horizontal", &config.pan_horizontal)?,
                AxisToken::parse("pan.pan_vertical", &config.pan_vertical)?,
                AxisToken::parse("pan.zoom", &config.zoom)?,
            ),
        };

        Ok(Self {
            horizontal,
            vertical,
            zoom,
            pan_speed: config::finite("pan.pan_speed", config.pan_speed)?,
            zoom_speed: config::finite("pan.zoom_speed", config.zoom_speed)?,
            horizontal_multiplier: config::multiplier(
                "pan.multipliers.pan_horizontal",
                config.multipliers.pan_horizontal,
            )?,
            vertical_multiplier: config::multiplier(
                "pan.multipliers.pan_vertical",
                config.multipliers.pan_vertical,
            )?,
            zoom_multiplier: config::multiplier("pan.multipliers.zoom", config.multipliers.zoom)?,
        })
    }
}

/// Pans and zooms the visible region of a 2D canvas
pub struct PanZoomController {
    settings: PanZoomSettings,
}

impl PanZoomController {
    pub fn new(settings: PanZoomSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PanZoomSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: PanZoomSettings) {
        self.settings = settings;
    }

    pub fn step(&self, bounds: &ViewBounds, axes: &AxisSet<f32>, steps: u32) -> Option<ViewBounds> {
        let s = &self.settings;
        let h = f64::from(s.horizontal.read(axes));
        let v = f64::from(s.vertical.read(axes));
        let z = f64::from(s.zoom.read(axes));
        let zooming = z.abs() > ZOOM_THRESHOLD;
        if h == 0.0 && v == 0.0 && !zooming {
            return None;
        }

        let steps = f64::from(steps);
        let width = bounds.width();
        let height = bounds.height();
        let (cx, cy) = bounds.center();
        // Both pan directions scale with width so panning feels the same on
        // wide and tall canvases.
        let cx = cx + h * width * s.pan_speed * s.horizontal_multiplier * steps;
        let cy = cy + v * width * s.pan_speed * s.vertical_multiplier * steps;

        let factor = if zooming {
            let per_step = (1.0 - z * s.zoom_speed * s.zoom_multiplier)
                .clamp(MIN_ZOOM_STEP, MAX_ZOOM_STEP);
            per_step.powf(steps)
        } else {
            1.0
        };

        Some(ViewBounds::from_center(
            cx,
            cy,
            width * factor,
            height * factor,
        ))
    }
}

impl MotionController for PanZoomController {
    fn mode(&self) -> Mode {
        Mode::Pan
    }

    fn update(&mut self, axes: &AxisSet<f32>, steps: u32, frame: &HostFrame) -> Option<PoseUpdate> {
        let bounds = frame.view?;
        self.step(&bounds, axes, steps).map(PoseUpdate::View)
    }
}
