//! SpaceMouse to host motion bridge
//!
//! A reader process decodes 6-DOF device reports and streams filtered samples
//! over loopback UDP. A receiver embedded in the host application drains them
//! once per frame and turns them into view or camera updates and hotkeys.

pub mod config;
pub mod device;
pub mod hotkey;
pub mod motion;
pub mod receiver;
pub mod telemetry;
pub mod transport;
