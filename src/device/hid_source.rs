//! HID access through `hidapi`
//!
//! The reader only sees [`ReportSource`] and [`SourceOpener`], so the loop can
//! be driven by scripted reports in tests.

use super::report::DeviceModel;
use hidapi::{DeviceInfo, HidApi, HidDevice};
use thiserror::Error;
use tracing::{debug, info};

/// Generic desktop page, multi-axis controller usage
const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
const USAGE_MULTI_AXIS: u16 = 0x08;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("HID API unavailable: {0}")]
    Api(String),

    #[error("No supported device attached")]
    NoDevice,

    #[error("Failed to open {name}: {reason}")]
    Open { name: String, reason: String },

    #[error("Device read failed: {0}")]
    Read(String),
}

/// A device delivering raw input reports
pub trait ReportSource {
    fn model(&self) -> DeviceModel;

    /// Reads one report into `buf`, waiting at most `timeout_ms`
    ///
    /// `Ok(0)` means the timeout elapsed. An error means the device is gone.
    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, SourceError>;
}

/// Finds and opens a device; called again after every disconnect
pub trait SourceOpener {
    type Source: ReportSource;

    fn open(&mut self) -> Result<Self::Source, SourceError>;
}

/// One enumerated interface of a supported device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceListing {
    pub model: DeviceModel,
    pub vendor_id: u16,
    pub usage_page: u16,
    pub usage: u16,
    pub path: String,
    pub product: Option<String>,
}

impl DeviceListing {
    fn from_info(info: &DeviceInfo) -> Option<Self> {
        let model = DeviceModel::identify(info.vendor_id(), info.product_id())?;
        Some(Self {
            model,
            vendor_id: info.vendor_id(),
            usage_page: info.usage_page(),
            usage: info.usage(),
            path: info.path().to_string_lossy().into_owned(),
            product: info.product_string().map(str::to_string),
        })
    }

    pub fn is_multi_axis(&self) -> bool {
        self.usage_page == USAGE_PAGE_GENERIC_DESKTOP && self.usage == USAGE_MULTI_AXIS
    }
}

/// Supported interfaces currently attached, multi-axis interfaces first
pub fn list_devices(api: &HidApi) -> Vec<DeviceListing> {
    let mut listings: Vec<DeviceListing> =
        api.device_list().filter_map(DeviceListing::from_info).collect();
    // Stable sort keeps enumeration order within each group.
    listings.sort_by_key(|listing| !listing.is_multi_axis());
    listings
}

pub struct HidReportSource {
    device: HidDevice,
    model: DeviceModel,
}

impl HidReportSource {
    /// Opens the preferred interface of the first supported device
    pub fn open_first(api: &mut HidApi) -> Result<Self, SourceError> {
        api.refresh_devices()
            .map_err(|e| SourceError::Api(e.to_string()))?;

        let info = api
            .device_list()
            .filter(|info| DeviceModel::identify(info.vendor_id(), info.product_id()).is_some())
            .min_by_key(|info| {
                !(info.usage_page() == USAGE_PAGE_GENERIC_DESKTOP
                    && info.usage() == USAGE_MULTI_AXIS)
            })
            .ok_or(SourceError::NoDevice)?;
        let model = DeviceModel::identify(info.vendor_id(), info.product_id())
            .ok_or(SourceError::NoDevice)?;

        debug!(
            "Opening {} at {}",
            model.name,
            info.path().to_string_lossy()
        );
        let device = info.open_device(api).map_err(|e| SourceError::Open {
            name: model.name.to_string(),
            reason: e.to_string(),
        })?;
        info!(
            "Opened {} ({:04X}:{:04X}, {:?} reports)",
            model.name,
            info.vendor_id(),
            model.product_id,
            model.variant
        );
        Ok(Self { device, model })
    }
}

impl ReportSource for HidReportSource {
    fn model(&self) -> DeviceModel {
        self.model
    }

    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, SourceError> {
        self.device
            .read_timeout(buf, timeout_ms)
            .map_err(|e| SourceError::Read(e.to_string()))
    }
}

/// Opens devices through a lazily created `HidApi`
#[derive(Default)]
pub struct HidOpener {
    api: Option<HidApi>,
}

impl SourceOpener for HidOpener {
    type Source = HidReportSource;

    fn open(&mut self) -> Result<HidReportSource, SourceError> {
        if self.api.is_none() {
            self.api = Some(HidApi::new().map_err(|e| SourceError::Api(e.to_string()))?);
        }
        match self.api.as_mut() {
            Some(api) => HidReportSource::open_first(api),
            None => Err(SourceError::Api("HID API not initialized".to_string())),
        }
    }
}
