//! Reader loop with statum state machine for device lifecycle
//!
//! Runs in its own process next to the device, decoding reports, filtering
//! them and sending datagrams to the receiver. A device that disappears is
//! reopened a bounded number of times before the loop gives up.
//!
//! # State Machine
//!
//! ```text
//!            open ok
//! Connecting ───────► Streaming ──► Shutdown / Cancelled
//!     ▲                   │
//!     └───────────────────┘
//!         disconnect
//! ```
//!
//! # Send policy
//!
//! A report that changes the button mask is sent immediately, so short
//! presses survive. Otherwise the current state is sent once per poll
//! interval while any axis is deflected.

use super::filter::FilterSettings;
use super::hid_source::{ReportSource, SourceOpener};
use super::report::ReportDecoder;
use super::sample::FilteredSample;
use super::status::{format_status, StatusLine};
use crate::config::{BridgeConfig, ConfigError};
use crate::hotkey::HotkeyBinding;
use crate::telemetry::{wall_clock_ns, LatencyWindow};
use crate::transport::{Datagram, PerfReport, ReaderLink, TransportError, WireMessage};
use statum::{machine, state};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const REPORT_BUFFER_LEN: usize = 64;
const HELLO_INTERVAL: Duration = Duration::from_secs(1);
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Device unavailable after {attempts} attempts: {reason}")]
    DeviceUnavailable { attempts: u32, reason: String },
}

/// How a reader run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Local stop request (Ctrl-C)
    Cancelled,
    /// The receiver sent `Shutdown`
    Shutdown,
}

/// Counters for one reader run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub reports: u64,
    pub decode_errors: u64,
    pub sent: u64,
    pub disconnects: u64,
}

/// Link state that outlives individual device connections
#[derive(Debug)]
pub struct Session {
    sequence: u32,
    hello_sequence: u32,
    next_hello: Option<Instant>,
    receiver_pid: Option<u32>,
    last_sent_buttons: u32,
    last_perf: Option<PerfReport>,
    latency: LatencyWindow,
    stats: ReaderStats,
}

impl Session {
    fn new() -> Self {
        Self {
            sequence: 0,
            hello_sequence: 0,
            next_hello: None,
            receiver_pid: None,
            last_sent_buttons: 0,
            last_perf: None,
            latency: LatencyWindow::default(),
            stats: ReaderStats::default(),
        }
    }
}

/// States for reader lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum ReaderState {
    Connecting, // Looking for a device
    Streaming,  // Device open, forwarding reports
}

/// Reader with compile-time state safety via statum
#[machine]
pub struct Reader<S: ReaderState> {
    config: BridgeConfig,
    filter: FilterSettings,
    bindings: Vec<HotkeyBinding>,
    link: ReaderLink,
    cancel: CancellationToken,
    status: StatusLine,
    session: Session,
}

/// Result of a connection attempt
pub enum Connection<Src> {
    Opened(Reader<Streaming>, Src),
    Cancelled,
}

/// Why streaming stopped
pub enum StreamEnd {
    Disconnected(Reader<Connecting>),
    Finished(ReaderExit),
}

impl<S: ReaderState> Reader<S> {
    pub fn stats(&self) -> ReaderStats {
        self.session.stats
    }

    /// PID reported by the receiver's `HelloReply`, once known
    pub fn receiver_pid(&self) -> Option<u32> {
        self.session.receiver_pid
    }
}

impl Reader<Connecting> {
    pub fn create(
        config: BridgeConfig,
        link: ReaderLink,
        cancel: CancellationToken,
        show_status: bool,
    ) -> Result<Self, ReaderError> {
        let filter = config.filter_settings()?;
        let bindings = config.bindings_for(config.mode)?;
        info!(
            "Reader sending to {} at {} Hz",
            link.target(),
            config.transport.poll_rate_hz
        );

        Ok(Self::new(
            config,
            filter,
            bindings,
            link,
            cancel,
            StatusLine::new(show_status),
            Session::new(),
        ))
    }

    /// Tries to open a device, up to `reconnect_attempts` times
    pub fn connect<O: SourceOpener>(
        self,
        opener: &mut O,
    ) -> Result<Connection<O::Source>, ReaderError> {
        let attempts = self.config.device.reconnect_attempts.max(1);
        let delay = Duration::from_millis(self.config.device.reconnect_delay_ms);
        let mut reason = String::new();

        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return Ok(Connection::Cancelled);
            }
            match opener.open() {
                Ok(source) => {
                    let model = source.model();
                    info!("Streaming from {} ({:?} reports)", model.name, model.variant);
                    return Ok(Connection::Opened(self.transition(), source));
                }
                Err(e) => {
                    warn!("Device open attempt {}/{} failed: {}", attempt, attempts, e);
                    reason = e.to_string();
                    if attempt < attempts && !sleep_unless_cancelled(&self.cancel, delay) {
                        return Ok(Connection::Cancelled);
                    }
                }
            }
        }

        Err(ReaderError::DeviceUnavailable { attempts, reason })
    }
}

impl Reader<Streaming> {
    /// Forwards reports until the device disappears or the run ends
    pub fn stream<Src: ReportSource>(mut self, source: &mut Src) -> StreamEnd {
        let model = source.model();
        let mut decoder = ReportDecoder::for_model(&model);
        let poll = Duration::from_secs_f64(1.0 / f64::from(self.config.transport.poll_rate_hz.max(1)));
        let read_timeout = self.config.device.read_timeout_ms;
        let mut buf = [0u8; REPORT_BUFFER_LEN];
        let mut current = FilteredSample::default();

        // Buttons held across a reconnect would otherwise stay held downstream.
        if self.session.last_sent_buttons != 0 {
            self.send_motion(current);
        }

        let mut interval_start = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return self.finish(ReaderExit::Cancelled);
            }
            if self.handle_replies() {
                return self.finish(ReaderExit::Shutdown);
            }
            self.maybe_send_hello();

            let remaining = poll.saturating_sub(interval_start.elapsed());
            let timeout_ms = remaining.as_millis().min(u128::from(read_timeout)) as i32;
            match source.read_report(&mut buf, timeout_ms) {
                Ok(0) => {}
                Ok(len) => match decoder.decode_buffer(&buf[..len]) {
                    Ok(sample) => {
                        self.session.stats.reports += 1;
                        current = self.filter.apply(&sample);
                        if current.buttons != self.session.last_sent_buttons {
                            self.send_motion(current);
                            self.draw_status(&current, true);
                        }
                    }
                    Err(e) => {
                        self.session.stats.decode_errors += 1;
                        debug!("Skipping report: {}", e);
                    }
                },
                Err(e) => {
                    self.status.finish();
                    warn!("{} disconnected: {}", model.name, e);
                    self.session.stats.disconnects += 1;
                    return StreamEnd::Disconnected(self.transition());
                }
            }

            if interval_start.elapsed() >= poll {
                interval_start = Instant::now();
                if !current.is_at_rest() {
                    self.send_motion(current);
                }
                self.draw_status(&current, false);
            }
        }
    }

    fn send_motion(&mut self, sample: FilteredSample) {
        self.session.sequence = self.session.sequence.wrapping_add(1);
        let message = Datagram::Motion(WireMessage {
            sequence: self.session.sequence,
            send_ns: wall_clock_ns(),
            sample,
        });
        // Failures are counted by the link; motion is never retried.
        if self.link.send(&message).is_ok() {
            self.session.stats.sent += 1;
        }
        self.session.last_sent_buttons = sample.buttons;
    }

    /// Processes receiver replies; returns true on `Shutdown`
    fn handle_replies(&mut self) -> bool {
        for reply in self.link.poll() {
            match reply {
                Datagram::HelloReply { host_pid, .. } => {
                    if self.session.receiver_pid != Some(host_pid) {
                        info!("Receiver answered (pid {})", host_pid);
                    }
                    self.session.receiver_pid = Some(host_pid);
                }
                Datagram::Perf(report) => {
                    if let Some(latency) = report.latency_last_ms {
                        self.session.latency.record(f64::from(latency));
                    }
                    self.session.last_perf = Some(report);
                }
                Datagram::Shutdown { .. } => {
                    info!("Shutdown requested by receiver");
                    return true;
                }
                other => debug!("Ignoring datagram kind {} from receiver", other.kind()),
            }
        }
        false
    }

    /// Announces the reader every second until the receiver answers
    fn maybe_send_hello(&mut self) {
        if self.session.receiver_pid.is_some() {
            return;
        }
        let now = Instant::now();
        if self.session.next_hello.is_some_and(|due| now < due) {
            return;
        }
        let hello = Datagram::Hello {
            sequence: self.session.hello_sequence,
            send_ns: wall_clock_ns(),
        };
        if self.link.send(&hello).is_ok() {
            debug!("Sent hello #{}", self.session.hello_sequence);
        }
        self.session.hello_sequence = self.session.hello_sequence.wrapping_add(1);
        self.session.next_hello = Some(now + HELLO_INTERVAL);
    }

    fn draw_status(&mut self, sample: &FilteredSample, buttons_changed: bool) {
        let now = Instant::now();
        if !self.status.due(now, buttons_changed) {
            return;
        }
        let line = format_status(
            sample,
            &self.bindings,
            self.session.last_perf.as_ref(),
            &self.session.latency,
        );
        self.status.draw(now, &line);
    }

    fn finish(self, exit: ReaderExit) -> StreamEnd {
        self.status.finish();
        let stats = self.session.stats;
        info!(
            "Reader finished ({:?}): {} reports, {} sent, {} decode errors, {} send failures",
            exit,
            stats.reports,
            stats.sent,
            stats.decode_errors,
            self.link.send_failures()
        );
        StreamEnd::Finished(exit)
    }
}

/// Sleeps for `duration` in short slices; returns false if cancelled meanwhile
fn sleep_unless_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(CANCEL_CHECK_INTERVAL.min(deadline - now));
    }
}

/// Runs the reader until cancelled, shut down, or out of reconnect attempts
pub fn run_reader<O: SourceOpener>(
    config: BridgeConfig,
    link: ReaderLink,
    opener: &mut O,
    cancel: CancellationToken,
    show_status: bool,
) -> Result<ReaderExit, ReaderError> {
    let mut reader = Reader::create(config, link, cancel, show_status)?;
    loop {
        let (streaming, mut source) = match reader.connect(opener)? {
            Connection::Opened(streaming, source) => (streaming, source),
            Connection::Cancelled => return Ok(ReaderExit::Cancelled),
        };
        match streaming.stream(&mut source) {
            StreamEnd::Disconnected(next) => reader = next,
            StreamEnd::Finished(exit) => return Ok(exit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::hid_source::SourceError;
    use crate::device::report::{DeviceModel, KNOWN_MODELS};
    use crate::transport::{loopback, DatagramPort, UdpPort, MAX_DATAGRAM_LEN};
    use std::collections::VecDeque;

    struct ScriptedSource {
        model: DeviceModel,
        reports: VecDeque<Vec<u8>>,
        idle_forever: bool,
    }

    impl ReportSource for ScriptedSource {
        fn model(&self) -> DeviceModel {
            self.model
        }

        fn read_report(&mut self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize, SourceError> {
            match self.reports.pop_front() {
                Some(report) => {
                    buf[..report.len()].copy_from_slice(&report);
                    Ok(report.len())
                }
                None if self.idle_forever => Ok(0),
                None => Err(SourceError::Read("unplugged".to_string())),
            }
        }
    }

    struct ScriptedOpener {
        sources: VecDeque<ScriptedSource>,
        opens: u32,
    }

    impl SourceOpener for ScriptedOpener {
        type Source = ScriptedSource;

        fn open(&mut self) -> Result<ScriptedSource, SourceError> {
            self.opens += 1;
            self.sources.pop_front().ok_or(SourceError::NoDevice)
        }
    }

    fn compact() -> DeviceModel {
        KNOWN_MODELS
            .iter()
            .copied()
            .find(|m| m.name == "SpaceMouse Compact")
            .unwrap()
    }

    fn test_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.transport.poll_rate_hz = 1000;
        config.device.reconnect_attempts = 2;
        config.device.reconnect_delay_ms = 0;
        config
    }

    fn drain(port: &mut UdpPort) -> Vec<Datagram> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        let mut received = Vec::new();
        while let Ok(Some((len, _))) = port.try_recv(&mut buf) {
            received.push(Datagram::decode(&buf[..len]).unwrap());
        }
        received
    }

    #[test]
    fn button_changes_are_sent_and_device_loss_is_bounded() {
        let mut receiver = UdpPort::bind(loopback(0)).unwrap();
        let link = ReaderLink::with_port(
            Box::new(UdpPort::bind(loopback(0)).unwrap()),
            receiver.local_addr().unwrap(),
        );
        let mut axis_report = vec![1u8];
        for value in [700i16, 0, 0, 0, 0, 0] {
            axis_report.extend_from_slice(&value.to_le_bytes());
        }
        let mut opener = ScriptedOpener {
            sources: VecDeque::from([ScriptedSource {
                model: compact(),
                reports: VecDeque::from([axis_report, vec![3, 0x01], vec![3, 0x00]]),
                idle_forever: false,
            }]),
            opens: 0,
        };

        let err = run_reader(test_config(), link, &mut opener, CancellationToken::new(), false)
            .unwrap_err();
        assert!(matches!(err, ReaderError::DeviceUnavailable { attempts: 2, .. }));
        assert_eq!(opener.opens, 3);

        std::thread::sleep(Duration::from_millis(20));
        let received = drain(&mut receiver);
        assert!(matches!(received.first(), Some(Datagram::Hello { sequence: 0, .. })));

        let motion: Vec<WireMessage> = received
            .iter()
            .filter_map(|d| match d {
                Datagram::Motion(m) => Some(*m),
                _ => None,
            })
            .collect();
        assert!(motion.windows(2).all(|w| w[0].sequence < w[1].sequence));
        let mut masks: Vec<u32> = motion.iter().map(|m| m.sample.buttons).collect();
        masks.dedup();
        assert!(masks == vec![1, 0] || masks == vec![0, 1, 0], "{:?}", masks);
        assert!(motion.iter().any(|m| (m.sample.axes.x - 2.0).abs() < 1e-5));
    }

    #[test]
    fn receiver_shutdown_ends_the_run() {
        let mut receiver = UdpPort::bind(loopback(0)).unwrap();
        let reader_port = UdpPort::bind(loopback(0)).unwrap();
        let reader_addr = reader_port.local_addr().unwrap();
        let link = ReaderLink::with_port(Box::new(reader_port), receiver.local_addr().unwrap());

        receiver
            .send_to(&Datagram::HelloReply { host_pid: 42, recv_ns: 0 }.encode(), reader_addr)
            .unwrap();
        receiver
            .send_to(&Datagram::Shutdown { send_ns: 0 }.encode(), reader_addr)
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let mut opener = ScriptedOpener {
            sources: VecDeque::from([ScriptedSource {
                model: compact(),
                reports: VecDeque::new(),
                idle_forever: true,
            }]),
            opens: 0,
        };
        let exit = run_reader(test_config(), link, &mut opener, CancellationToken::new(), false)
            .unwrap();
        assert_eq!(exit, ReaderExit::Shutdown);
    }

    #[test]
    fn cancelled_before_open_returns_cleanly() {
        let link = ReaderLink::with_port(
            Box::new(UdpPort::bind(loopback(0)).unwrap()),
            loopback(9),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut opener = ScriptedOpener {
            sources: VecDeque::new(),
            opens: 0,
        };
        let exit = run_reader(test_config(), link, &mut opener, cancel, false).unwrap();
        assert_eq!(exit, ReaderExit::Cancelled);
        assert_eq!(opener.opens, 0);
    }
}
