//! Host side of the bridge
//!
//! [`ReceiverHandle`] is embedded in the host application and ticked from its
//! frame loop. [`Host`] is everything the receiver needs from that
//! application; [`HeadlessHost`] is an in-memory stand-in used by the
//! `listen` command and the tests.

pub mod drain;
pub mod driver;
pub mod error;
pub mod handle;
pub mod headless;
pub mod host;

pub use driver::run_tick_loop;
pub use error::ReceiverError;
pub use handle::{ReceiverCounters, ReceiverHandle, TickReport, APPLY_TOLERANCE};
pub use headless::HeadlessHost;
pub use host::{Host, PaneKind, PoseTarget};
