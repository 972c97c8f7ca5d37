//! Latency and backlog diagnostics
//!
//! Shared by the reader (fed from perf replies) and the receiver (fed from
//! drained datagrams). Nothing here gates correctness.

use crate::transport::PerfReport;
use std::collections::VecDeque;

pub const WINDOW_CAPACITY: usize = 300;

// Latencies outside this range come from wall-clock adjustments.
const MIN_PLAUSIBLE_LATENCY_MS: f64 = -100.0;
const MAX_PLAUSIBLE_LATENCY_MS: f64 = 10_000.0;

/// Wall-clock nanoseconds since the Unix epoch
pub fn wall_clock_ns() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|ns| ns.max(0) as u64)
        .unwrap_or_default()
}

/// Sliding window of latency samples plus running statistics
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    count: u64,
    mean: f64,
    m2: f64,
    min: Option<f64>,
    max: Option<f64>,
    last: Option<f64>,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }
}

impl LatencyWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: None,
            max: None,
            last: None,
        }
    }

    /// Records one latency; returns false when the value is implausible
    pub fn record(&mut self, latency_ms: f64) -> bool {
        if !latency_ms.is_finite()
            || !(MIN_PLAUSIBLE_LATENCY_MS..=MAX_PLAUSIBLE_LATENCY_MS).contains(&latency_ms)
        {
            return false;
        }

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
        self.last = Some(latency_ms);
        self.min = Some(self.min.map_or(latency_ms, |m| m.min(latency_ms)));
        self.max = Some(self.max.map_or(latency_ms, |m| m.max(latency_ms)));

        // Welford
        self.count += 1;
        let delta = latency_ms - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (latency_ms - self.mean);
        true
    }

    /// Nearest-rank percentile over the window, `p` in 0.0..=1.0
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let index = (p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64) as usize;
        Some(sorted[index])
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    pub fn std_dev(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2 / (self.count - 1) as f64).sqrt())
    }
}

/// Datagrams drained per tick
#[derive(Debug, Clone, Default)]
pub struct BacklogStats {
    last: u32,
    max: u32,
    sum: u64,
    ticks: u64,
}

impl BacklogStats {
    pub fn record(&mut self, backlog: u32) {
        self.last = backlog;
        self.max = self.max.max(backlog);
        self.sum += u64::from(backlog);
        self.ticks += 1;
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn average(&self) -> Option<f64> {
        (self.ticks > 0).then(|| self.sum as f64 / self.ticks as f64)
    }
}

/// Detects lost and reordered sender sequence numbers
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last: Option<u32>,
    skipped: u64,
    reordered: u64,
}

impl SequenceTracker {
    pub fn observe(&mut self, sequence: u32) {
        match self.last {
            Some(last) if sequence > last => {
                self.skipped += u64::from(sequence - last - 1);
                self.last = Some(sequence);
            }
            Some(_) => self.reordered += 1,
            None => self.last = Some(sequence),
        }
    }

    /// Forgets the last sequence so a restarted sender starts a fresh run
    ///
    /// Totals are kept.
    pub fn restart(&mut self) {
        self.last = None;
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn reordered(&self) -> u64 {
        self.reordered
    }
}

/// Duration of pose application and the interval between applications
#[derive(Debug, Clone)]
pub struct ApplyTimer {
    last_ms: Option<f64>,
    last_interval_ms: Option<f64>,
    intervals: VecDeque<f64>,
    last_end_ns: Option<u64>,
}

impl Default for ApplyTimer {
    fn default() -> Self {
        Self {
            last_ms: None,
            last_interval_ms: None,
            intervals: VecDeque::with_capacity(WINDOW_CAPACITY),
            last_end_ns: None,
        }
    }
}

impl ApplyTimer {
    pub fn record(&mut self, start_ns: u64, end_ns: u64) {
        self.last_ms = Some(end_ns.saturating_sub(start_ns) as f64 / 1_000_000.0);
        if let Some(previous) = self.last_end_ns {
            let interval = end_ns.saturating_sub(previous) as f64 / 1_000_000.0;
            if self.intervals.len() == WINDOW_CAPACITY {
                self.intervals.pop_front();
            }
            self.intervals.push_back(interval);
            self.last_interval_ms = Some(interval);
        }
        self.last_end_ns = Some(end_ns);
    }

    pub fn last_ms(&self) -> Option<f64> {
        self.last_ms
    }

    pub fn last_interval_ms(&self) -> Option<f64> {
        self.last_interval_ms
    }

    pub fn apply_hz(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            return None;
        }
        let mean = self.intervals.iter().sum::<f64>() / self.intervals.len() as f64;
        (mean > 0.0).then(|| 1000.0 / mean)
    }
}

/// Receiver-side aggregate
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pub latency: LatencyWindow,
    pub backlog: BacklogStats,
    pub sequence: SequenceTracker,
    pub apply: ApplyTimer,
    last_perf_sent_ns: Option<u64>,
}

impl Telemetry {
    /// Records one-way latency of a message sent at `send_ns` and seen at `recv_ns`
    pub fn record_latency(&mut self, send_ns: u64, recv_ns: u64) -> bool {
        let latency_ms = (recv_ns as i128 - send_ns as i128) as f64 / 1_000_000.0;
        self.latency.record(latency_ms)
    }

    /// True at most once per `interval_ns`
    pub fn perf_due(&mut self, now_ns: u64, interval_ns: u64) -> bool {
        match self.last_perf_sent_ns {
            Some(last) if now_ns.saturating_sub(last) < interval_ns => false,
            _ => {
                self.last_perf_sent_ns = Some(now_ns);
                true
            }
        }
    }

    pub fn snapshot(&self, recv_ns: u64) -> PerfReport {
        let as_f32 = |v: Option<f64>| v.map(|v| v as f32);
        PerfReport {
            recv_ns,
            latency_last_ms: as_f32(self.latency.last()),
            latency_p50_ms: as_f32(self.latency.percentile(0.50)),
            latency_p90_ms: as_f32(self.latency.percentile(0.90)),
            latency_p99_ms: as_f32(self.latency.percentile(0.99)),
            backlog_last: self.backlog.last(),
            backlog_max: self.backlog.max(),
            skipped: u32::try_from(self.sequence.skipped()).unwrap_or(u32::MAX),
            reordered: u32::try_from(self.sequence.reordered()).unwrap_or(u32::MAX),
            apply_last_ms: as_f32(self.apply.last_ms()),
            apply_interval_ms: as_f32(self.apply.last_interval_ms()),
            apply_hz: as_f32(self.apply.apply_hz()),
        }
    }
}
