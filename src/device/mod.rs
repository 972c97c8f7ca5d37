//! Device side of the bridge: HID reports in, filtered samples out

pub mod filter;
pub mod hid_source;
pub mod reader;
pub mod report;
pub mod sample;
pub mod status;

pub use filter::FilterSettings;
pub use hid_source::{list_devices, HidOpener, ReportSource, SourceError, SourceOpener};
pub use reader::{run_reader, ReaderError, ReaderExit, ReaderStats};
pub use report::{DecodeError, DecoderVariant, DeviceModel, ReportDecoder};
pub use sample::{Axis, AxisSet, FilteredSample, MotionSample};
