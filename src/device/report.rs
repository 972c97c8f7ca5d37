//! Report decoding for 6-DOF devices
//!
//! Devices report translation, rotation and buttons in numbered HID reports.
//! Two framings exist in the field:
//!
//! ```text
//! Combined:  id 1 = [tx ty tz rx ry rz]     id 3 = [button bytes..]
//! Split:     id 1 = [tx ty tz]  id 2 = [rx ry rz]  id 3 = [button bytes..]
//! ```
//!
//! On split devices the half that did not arrive in the current report is
//! carried over from the previous one until it is refreshed.

use super::sample::{AxisSet, MotionSample};
use tracing::debug;

pub const VENDOR_3DCONNEXION: u16 = 0x256F;
pub const VENDOR_LOGITECH: u16 = 0x046D;

pub const REPORT_TRANSLATION: u8 = 1;
pub const REPORT_ROTATION: u8 = 2;
pub const REPORT_BUTTONS: u8 = 3;

const HALF_LEN: usize = 6;
const COMBINED_LEN: usize = 12;

/// Framing strategy selected when the device is identified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderVariant {
    /// Translation and rotation arrive together in report 1
    Combined,
    /// Translation in report 1, rotation in report 2
    Split,
}

/// A supported device model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceModel {
    pub product_id: u16,
    pub name: &'static str,
    pub variant: DecoderVariant,
    pub button_count: u8,
}

pub const KNOWN_MODELS: [DeviceModel; 11] = [
    DeviceModel::new(0xC626, "SpaceNavigator", DecoderVariant::Split, 2),
    DeviceModel::new(0xC627, "SpaceExplorer", DecoderVariant::Split, 15),
    DeviceModel::new(0xC628, "SpacePilot", DecoderVariant::Split, 21),
    DeviceModel::new(0xC629, "SpacePilot Pro", DecoderVariant::Split, 31),
    DeviceModel::new(0xC62B, "SpaceMouse Pro", DecoderVariant::Split, 15),
    DeviceModel::new(0xC62E, "SpaceMouse Wireless", DecoderVariant::Combined, 2),
    DeviceModel::new(0xC631, "SpaceMouse Pro Wireless", DecoderVariant::Combined, 15),
    DeviceModel::new(
        0xC632,
        "SpaceMouse Pro Wireless Receiver",
        DecoderVariant::Combined,
        15,
    ),
    DeviceModel::new(0xC633, "SpaceMouse Enterprise", DecoderVariant::Combined, 31),
    DeviceModel::new(0xC635, "SpaceMouse Compact", DecoderVariant::Combined, 2),
    DeviceModel::new(0xC652, "Universal Receiver", DecoderVariant::Combined, 15),
];

impl DeviceModel {
    pub const fn new(
        product_id: u16,
        name: &'static str,
        variant: DecoderVariant,
        button_count: u8,
    ) -> Self {
        Self {
            product_id,
            name,
            variant,
            button_count,
        }
    }

    /// Looks up a model by vendor and product id
    pub fn identify(vendor_id: u16, product_id: u16) -> Option<DeviceModel> {
        if vendor_id != VENDOR_3DCONNEXION && vendor_id != VENDOR_LOGITECH {
            return None;
        }
        KNOWN_MODELS
            .iter()
            .find(|model| model.product_id == product_id)
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Empty report")]
    Empty,

    #[error("Unknown report id {0}")]
    UnknownReport(u8),

    #[error("Report {report_id} has {actual} payload bytes, expected {expected}")]
    LengthMismatch {
        report_id: u8,
        expected: usize,
        actual: usize,
    },
}

/// Stateful decoder for one device
///
/// Holds the last known value of each half so split devices can be merged.
#[derive(Debug, Clone)]
pub struct ReportDecoder {
    variant: DecoderVariant,
    button_count: u8,
    translation: [i16; 3],
    rotation: [i16; 3],
    buttons: u32,
    sequence: u32,
}

impl ReportDecoder {
    pub fn new(variant: DecoderVariant, button_count: u8) -> Self {
        Self {
            variant,
            button_count: button_count.min(32),
            translation: [0; 3],
            rotation: [0; 3],
            buttons: 0,
            sequence: 0,
        }
    }

    pub fn for_model(model: &DeviceModel) -> Self {
        Self::new(model.variant, model.button_count)
    }

    pub fn variant(&self) -> DecoderVariant {
        self.variant
    }

    /// Decodes a buffer as read from the device, report id first
    pub fn decode_buffer(&mut self, buffer: &[u8]) -> Result<MotionSample, DecodeError> {
        match buffer.split_first() {
            Some((report_id, payload)) => self.decode(*report_id, payload),
            None => Err(DecodeError::Empty),
        }
    }

    /// Decodes one report payload into a merged sample
    pub fn decode(&mut self, report_id: u8, payload: &[u8]) -> Result<MotionSample, DecodeError> {
        match (report_id, self.variant) {
            (REPORT_TRANSLATION, DecoderVariant::Combined) => {
                expect_len(report_id, payload, COMBINED_LEN)?;
                self.translation = read_triplet(&payload[..HALF_LEN]);
                self.rotation = read_triplet(&payload[HALF_LEN..]);
            }
            (REPORT_TRANSLATION, DecoderVariant::Split) => {
                expect_len(report_id, payload, HALF_LEN)?;
                self.translation = read_triplet(payload);
            }
            (REPORT_ROTATION, DecoderVariant::Split) => {
                expect_len(report_id, payload, HALF_LEN)?;
                self.rotation = read_triplet(payload);
            }
            (REPORT_BUTTONS, _) => {
                self.buttons = self.read_buttons(payload)?;
            }
            _ => return Err(DecodeError::UnknownReport(report_id)),
        }

        self.sequence = self.sequence.wrapping_add(1);
        debug!(
            "Decoded report {} -> t={:?} r={:?} buttons={:#06x}",
            report_id, self.translation, self.rotation, self.buttons
        );
        Ok(self.current())
    }

    fn current(&self) -> MotionSample {
        let [x, y, z] = self.translation;
        let [rx, ry, rz] = self.rotation;
        MotionSample {
            axes: AxisSet {
                x,
                y,
                z,
                rx,
                ry,
                rz,
            },
            buttons: self.buttons,
            sequence: self.sequence,
        }
    }

    // Only the bytes covering the declared button count are interpreted.
    fn read_buttons(&self, payload: &[u8]) -> Result<u32, DecodeError> {
        let needed = (self.button_count as usize).div_ceil(8);
        if payload.len() < needed {
            return Err(DecodeError::LengthMismatch {
                report_id: REPORT_BUTTONS,
                expected: needed,
                actual: payload.len(),
            });
        }

        let mut mask = payload[..needed]
            .iter()
            .enumerate()
            .fold(0u32, |mask, (i, byte)| mask | (u32::from(*byte) << (8 * i)));
        if self.button_count < 32 {
            mask &= (1u32 << self.button_count) - 1;
        }
        Ok(mask)
    }
}

fn expect_len(report_id: u8, payload: &[u8], expected: usize) -> Result<(), DecodeError> {
    if payload.len() != expected {
        return Err(DecodeError::LengthMismatch {
            report_id,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn read_triplet(bytes: &[u8]) -> [i16; 3] {
    [
        i16::from_le_bytes([bytes[0], bytes[1]]),
        i16::from_le_bytes([bytes[2], bytes[3]]),
        i16::from_le_bytes([bytes[4], bytes[5]]),
    ]
}
