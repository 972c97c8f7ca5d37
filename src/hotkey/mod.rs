//! SpaceMouse buttons as hotkeys
//!
//! Buttons are bound per mode to a key combo, a named host command or the
//! built-in `reset_rotation`. The detector only decides *when* something
//! fires; delivering it is up to the host.

pub mod combo;
pub mod detector;
pub mod diagnostics;

pub use combo::{Key, KeyCombo, Modifier};
pub use detector::HotkeyDetector;
pub use diagnostics::{HotkeyDiagnostics, HotkeyRecord};

use crate::config::{BindingSpec, ConfigError};
use crate::motion::Mode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

/// Highest button number a binding may name (1-based, one bit per button)
pub const MAX_BUTTON: u8 = 32;

const RESET_ROTATION: &str = "reset_rotation";
const DISABLED_TOKENS: [&str; 6] = ["none", "off", "disabled", "disable", "null", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Fire once on press
    OneShot,
    /// Assert on press, deassert on release
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HotkeyAction {
    Combo(KeyCombo),
    Command(String),
    ResetRotation,
}

impl Display for HotkeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyAction::Combo(combo) => write!(f, "combo {}", combo),
            HotkeyAction::Command(name) => write!(f, "command {}", name),
            HotkeyAction::ResetRotation => write!(f, "{}", RESET_ROTATION),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    /// 1-based button number as printed on the device
    pub button: u8,
    pub action: HotkeyAction,
    pub activation: Activation,
}

impl HotkeyBinding {
    /// 0-based bit index in the button mask
    pub fn bit(&self) -> u8 {
        self.button - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonTransition {
    Pressed,
    Released,
}

/// One press or release, in the order it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEdgeEvent {
    pub button_index: u8,
    pub transition: ButtonTransition,
    pub tick_sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotkeyPhase {
    /// One-shot trigger
    Fire,
    /// Hold started
    Assert,
    /// Hold ended
    Deassert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyEvent {
    pub button: u8,
    pub action: HotkeyAction,
    pub phase: HotkeyPhase,
    pub tick_sequence: u64,
}

/// What the host reports after being handed a hotkey event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InjectionOutcome {
    /// The host cannot tell whether the event landed
    #[default]
    Unknown,
    Delivered,
    Rejected(String),
}

/// Turns one mode's `[hotkeys.<mode>]` table into bindings sorted by button
///
/// Keys are `button_<N>` or `<N>` with N in `1..=32`. Disabled entries are
/// dropped.
pub fn resolve_bindings(
    mode: Mode,
    table: &BTreeMap<String, BindingSpec>,
) -> Result<Vec<HotkeyBinding>, ConfigError> {
    let mut bindings = Vec::with_capacity(table.len());
    let mut seen = BTreeSet::new();

    for (key, spec) in table {
        let field = format!("hotkeys.{}.{}", mode, key);
        let button = parse_button(&field, key)?;
        if !seen.insert(button) {
            return Err(ConfigError::InvalidValue {
                field,
                reason: format!("button {} is bound more than once", button),
            });
        }

        if let Some((action, activation)) = resolve_spec(&field, spec)? {
            bindings.push(HotkeyBinding {
                button,
                action,
                activation,
            });
        }
    }

    bindings.sort_by_key(|b| b.button);
    Ok(bindings)
}

fn parse_button(field: &str, key: &str) -> Result<u8, ConfigError> {
    let digits = key.strip_prefix("button_").unwrap_or(key);
    match digits.parse::<u8>() {
        Ok(n) if (1..=MAX_BUTTON).contains(&n) => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected button_1 .. button_{}", MAX_BUTTON),
        }),
    }
}

fn is_disabled(text: &str) -> bool {
    let lowered = text.trim().to_ascii_lowercase();
    DISABLED_TOKENS.contains(&lowered.as_str())
}

fn resolve_combo(field: &str, text: &str) -> Result<HotkeyAction, ConfigError> {
    if text.trim().eq_ignore_ascii_case(RESET_ROTATION) {
        return Ok(HotkeyAction::ResetRotation);
    }
    text.parse::<KeyCombo>()
        .map(HotkeyAction::Combo)
        .map_err(|reason| ConfigError::InvalidHotkey {
            field: field.to_string(),
            combo: text.to_string(),
            reason,
        })
}

fn default_activation(action: &HotkeyAction) -> Activation {
    match action {
        HotkeyAction::Combo(_) => Activation::Hold,
        HotkeyAction::Command(_) | HotkeyAction::ResetRotation => Activation::OneShot,
    }
}

fn resolve_spec(
    field: &str,
    spec: &BindingSpec,
) -> Result<Option<(HotkeyAction, Activation)>, ConfigError> {
    match spec {
        BindingSpec::Combo(text) => {
            if is_disabled(text) {
                return Ok(None);
            }
            let action = resolve_combo(field, text)?;
            let activation = default_activation(&action);
            Ok(Some((action, activation)))
        }
        BindingSpec::Detailed {
            combo,
            command,
            activation,
        } => {
            let action = match (combo.as_deref(), command.as_deref()) {
                (Some(text), None) if is_disabled(text) => return Ok(None),
                (Some(text), None) => resolve_combo(field, text)?,
                (None, Some(name)) if name.trim().is_empty() => {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        reason: "command name is empty".to_string(),
                    })
                }
                (None, Some(name)) => HotkeyAction::Command(name.trim().to_string()),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        reason: "set exactly one of combo or command".to_string(),
                    })
                }
            };
            let activation = activation.unwrap_or_else(|| default_activation(&action));
            Ok(Some((action, activation)))
        }
    }
}
