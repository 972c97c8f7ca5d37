//! Local datagram transport between the reader and the receiver
//!
//! ```text
//! Reader ── Motion / Hello ──────────────► Receiver (127.0.0.1:19879)
//!        ◄─ HelloReply / Perf / Shutdown ─
//! ```
//!
//! The channel is unordered and unreliable. A lost motion datagram is
//! equivalent to an idle tick and is never retried.

pub mod codec;
pub mod port;

pub use codec::{Datagram, PerfReport, WireMessage, FORMAT_VERSION};
pub use port::{DatagramPort, ReaderLink, UdpPort};

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub const DEFAULT_PORT: u16 = 19879;

/// Largest datagram either side will read
pub const MAX_DATAGRAM_LEN: usize = 512;

pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Empty datagram")]
    Empty,

    #[error("Wire format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("Unknown datagram kind {0:#04x}")]
    UnknownKind(u8),

    #[error("Datagram kind {kind:#04x} has {actual} bytes, expected {expected}")]
    Length {
        kind: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to send datagram: {0}")]
    SendFailure(String),

    #[error("Socket error: {0}")]
    Socket(String),
}
