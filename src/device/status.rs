//! Single-line operator status for the reader
//!
//! Redrawn in place with `\r`. The line is cut to one column less than the
//! terminal so it never wraps, since a wrapped line breaks the redraw.

use super::sample::FilteredSample;
use crate::hotkey::HotkeyBinding;
use crate::telemetry::LatencyWindow;
use crate::transport::PerfReport;
use std::io::Write;
use std::time::{Duration, Instant};

pub const REFRESH_INTERVAL: Duration = Duration::from_millis(50);
const FALLBACK_WIDTH: usize = 80;
const MIN_WIDTH: usize = 20;
const MAX_LISTED_BUTTONS: usize = 6;

/// Terminal width from `COLUMNS`, or 80
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|width| *width >= MIN_WIDTH)
        .unwrap_or(FALLBACK_WIDTH)
}

/// Truncates or pads `line` to exactly `width - 1` characters
pub fn fit_to_width(line: &str, width: usize) -> String {
    let max_len = width.saturating_sub(1).max(1);
    let mut fitted: String = line.chars().take(max_len).collect();
    let len = fitted.chars().count();
    fitted.extend(std::iter::repeat(' ').take(max_len - len));
    fitted
}

fn ms(value: Option<f32>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.1}", v))
}

/// Axes, pressed buttons with their bindings, and receiver-reported latency
pub fn format_status(
    sample: &FilteredSample,
    bindings: &[HotkeyBinding],
    perf: Option<&PerfReport>,
    latency: &LatencyWindow,
) -> String {
    let a = &sample.axes;
    let mut line = format!(
        "X:{:+.2} Y:{:+.2} Z:{:+.2} | RX:{:+.2} RY:{:+.2} RZ:{:+.2}",
        a.x, a.y, a.z, a.rx, a.ry, a.rz
    );

    if sample.buttons != 0 {
        let pressed: Vec<u8> = (0..32u8)
            .filter(|&bit| sample.buttons & (1 << bit) != 0)
            .map(|bit| bit + 1)
            .collect();
        let parts: Vec<String> = pressed
            .iter()
            .take(MAX_LISTED_BUTTONS)
            .map(|button| match bindings.iter().find(|b| b.button == *button) {
                Some(binding) => format!("B{}:{}", button, binding.action),
                None => format!("B{}", button),
            })
            .collect();
        line.push_str(&format!(" BTN:{:04X}", sample.buttons));
        if pressed.len() > MAX_LISTED_BUTTONS {
            line.push_str(&format!(" +{}", pressed.len() - MAX_LISTED_BUTTONS));
        }
        line.push(' ');
        line.push_str(&parts.join(" "));
    }

    if let Some(perf) = perf {
        let p90 = latency
            .percentile(0.9)
            .map(|v| v as f32)
            .or(perf.latency_p90_ms);
        line.push_str(&format!(
            " | LAT:{}ms P90:{}ms B:{} Hz:{}",
            ms(perf.latency_last_ms),
            ms(p90),
            perf.backlog_last,
            ms(perf.apply_hz)
        ));
    }
    line
}

/// Throttled writer for the status line
#[derive(Debug)]
pub struct StatusLine {
    last_draw: Option<Instant>,
    width: usize,
    enabled: bool,
}

impl StatusLine {
    pub fn new(enabled: bool) -> Self {
        Self {
            last_draw: None,
            width: terminal_width(),
            enabled,
        }
    }

    /// True when a redraw is allowed now; button changes always redraw
    pub fn due(&self, now: Instant, buttons_changed: bool) -> bool {
        self.enabled
            && (buttons_changed
                || self
                    .last_draw
                    .map_or(true, |last| now.duration_since(last) >= REFRESH_INTERVAL))
    }

    pub fn draw(&mut self, now: Instant, line: &str) {
        self.last_draw = Some(now);
        let mut stdout = std::io::stdout().lock();
        // Status output is best effort.
        let _ = write!(stdout, "\r{}", fit_to_width(line, self.width));
        let _ = stdout.flush();
    }

    /// Moves past the status line so following log output starts clean
    pub fn finish(&self) {
        if self.enabled && self.last_draw.is_some() {
            println!();
        }
    }
}
