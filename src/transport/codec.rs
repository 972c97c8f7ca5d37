//! Fixed-size datagram encoding
//!
//! Every datagram starts with a format version byte and a kind byte. Bodies are
//! little-endian and each kind has exactly one valid length, so a mismatched
//! peer fails loudly instead of misparsing.

use crate::device::sample::{AxisSet, FilteredSample};
use crate::transport::TransportError;

pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 2;

pub mod kinds {
    pub const MOTION: u8 = 0x01;
    pub const HELLO: u8 = 0x02;
    pub const HELLO_REPLY: u8 = 0x03;
    pub const PERF: u8 = 0x04;
    pub const SHUTDOWN: u8 = 0x05;
}

/// One filtered sample as sent by the reader
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WireMessage {
    /// Strictly increasing for the lifetime of one reader process
    pub sequence: u32,
    /// Wall-clock nanoseconds since the Unix epoch at send time
    pub send_ns: u64,
    pub sample: FilteredSample,
}

/// Receiver-side performance figures fed back to the reader
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerfReport {
    pub recv_ns: u64,
    pub latency_last_ms: Option<f32>,
    pub latency_p50_ms: Option<f32>,
    pub latency_p90_ms: Option<f32>,
    pub latency_p99_ms: Option<f32>,
    pub backlog_last: u32,
    pub backlog_max: u32,
    pub skipped: u32,
    pub reordered: u32,
    pub apply_last_ms: Option<f32>,
    pub apply_interval_ms: Option<f32>,
    pub apply_hz: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Datagram {
    Motion(WireMessage),
    Hello { sequence: u32, send_ns: u64 },
    HelloReply { host_pid: u32, recv_ns: u64 },
    Perf(PerfReport),
    Shutdown { send_ns: u64 },
}

impl Datagram {
    pub fn kind(&self) -> u8 {
        match self {
            Datagram::Motion(_) => kinds::MOTION,
            Datagram::Hello { .. } => kinds::HELLO,
            Datagram::HelloReply { .. } => kinds::HELLO_REPLY,
            Datagram::Perf(_) => kinds::PERF,
            Datagram::Shutdown { .. } => kinds::SHUTDOWN,
        }
    }

    /// Total encoded length for a datagram kind
    pub fn encoded_len(kind: u8) -> Option<usize> {
        let body = match kind {
            kinds::MOTION => 4 + 8 + 4 + 6 * 4 + 4,
            kinds::HELLO => 4 + 8,
            kinds::HELLO_REPLY => 4 + 8,
            kinds::PERF => 8 + 4 * 4 + 4 * 4 + 3 * 4,
            kinds::SHUTDOWN => 8,
            _ => return None,
        };
        Some(HEADER_LEN + body)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_header(self.kind());
        match self {
            Datagram::Motion(message) => {
                w.u32(message.sequence);
                w.u64(message.send_ns);
                w.u32(message.sample.sequence);
                for value in message.sample.axes.to_array() {
                    w.f32(value);
                }
                w.u32(message.sample.buttons);
            }
            Datagram::Hello { sequence, send_ns } => {
                w.u32(*sequence);
                w.u64(*send_ns);
            }
            Datagram::HelloReply { host_pid, recv_ns } => {
                w.u32(*host_pid);
                w.u64(*recv_ns);
            }
            Datagram::Perf(perf) => {
                w.u64(perf.recv_ns);
                w.opt_f32(perf.latency_last_ms);
                w.opt_f32(perf.latency_p50_ms);
                w.opt_f32(perf.latency_p90_ms);
                w.opt_f32(perf.latency_p99_ms);
                w.u32(perf.backlog_last);
                w.u32(perf.backlog_max);
                w.u32(perf.skipped);
                w.u32(perf.reordered);
                w.opt_f32(perf.apply_last_ms);
                w.opt_f32(perf.apply_interval_ms);
                w.opt_f32(perf.apply_hz);
            }
            Datagram::Shutdown { send_ns } => {
                w.u64(*send_ns);
            }
        }
        w.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        let (version, kind) = match bytes {
            [] => return Err(TransportError::Empty),
            [version] => (*version, None),
            [version, kind, ..] => (*version, Some(*kind)),
        };
        if version != FORMAT_VERSION {
            return Err(TransportError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: version,
            });
        }
        let kind = kind.ok_or(TransportError::Length {
            kind: 0,
            expected: HEADER_LEN,
            actual: bytes.len(),
        })?;
        let expected = Self::encoded_len(kind).ok_or(TransportError::UnknownKind(kind))?;
        if bytes.len() != expected {
            return Err(TransportError::Length {
                kind,
                expected,
                actual: bytes.len(),
            });
        }

        let mut r = Reader::new(&bytes[HEADER_LEN..]);
        let datagram = match kind {
            kinds::MOTION => {
                let sequence = r.u32();
                let send_ns = r.u64();
                let sample_sequence = r.u32();
                let axes = AxisSet::from_array(std::array::from_fn(|_| r.f32()));
                let buttons = r.u32();
                Datagram::Motion(WireMessage {
                    sequence,
                    send_ns,
                    sample: FilteredSample {
                        axes,
                        buttons,
                        sequence: sample_sequence,
                    },
                })
            }
            kinds::HELLO => Datagram::Hello {
                sequence: r.u32(),
                send_ns: r.u64(),
            },
            kinds::HELLO_REPLY => Datagram::HelloReply {
                host_pid: r.u32(),
                recv_ns: r.u64(),
            },
            kinds::PERF => Datagram::Perf(PerfReport {
                recv_ns: r.u64(),
                latency_last_ms: r.opt_f32(),
                latency_p50_ms: r.opt_f32(),
                latency_p90_ms: r.opt_f32(),
                latency_p99_ms: r.opt_f32(),
                backlog_last: r.u32(),
                backlog_max: r.u32(),
                skipped: r.u32(),
                reordered: r.u32(),
                apply_last_ms: r.opt_f32(),
                apply_interval_ms: r.opt_f32(),
                apply_hz: r.opt_f32(),
            }),
            _ => Datagram::Shutdown { send_ns: r.u64() },
        };
        Ok(datagram)
    }
}

struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    fn with_header(kind: u8) -> Self {
        let mut buffer = Vec::with_capacity(Datagram::encoded_len(kind).unwrap_or(HEADER_LEN));
        buffer.push(FORMAT_VERSION);
        buffer.push(kind);
        Self { buffer }
    }

    fn u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    // Absent values travel as NaN.
    fn opt_f32(&mut self, value: Option<f32>) {
        self.f32(value.unwrap_or(f32::NAN));
    }

    fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

// Length is checked before a Reader is built, so reads never run past the end.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn opt_f32(&mut self) -> Option<f32> {
        let value = self.f32();
        (!value.is_nan()).then_some(value)
    }
}
