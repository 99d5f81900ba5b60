//! Per-process flow accumulation.
//!
//! Counters are keyed by PID and pre-populated for every candidate before
//! capture starts, so the key set of every result map equals the candidate
//! set whether or not traffic was seen.

use crate::process::Pid;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Divisor used when no window could be measured
pub const NEUTRAL_WINDOW: Duration = Duration::from_secs(1);

/// Traffic direction relative to the owning process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Receive,
    Transmit,
}

/// Observation interval bounded by the first and latest packet timestamps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowWindow {
    first: Option<Instant>,
    last: Option<Instant>,
}

impl FlowWindow {
    pub fn observe(&mut self, timestamp: Instant) {
        if self.first.is_none() {
            self.first = Some(timestamp);
        }
        self.last = Some(match self.last {
            Some(last) if last > timestamp => last,
            _ => timestamp,
        });
    }

    /// True once at least one packet has been observed
    pub fn is_open(&self) -> bool {
        self.first.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match (self.first, self.last) {
            (Some(first), Some(last)) => last.saturating_duration_since(first),
            _ => Duration::ZERO,
        }
    }
}

/// Pick the rate divisor for a capture run.
///
/// Each interface measures its own window rather than all interfaces sharing
/// one opened by the first packet seen anywhere.
///
/// Aborted runs and runs where no window spans any time fall back to
/// [`NEUTRAL_WINDOW`]; otherwise the longest per-interface window is used.
pub fn rate_divisor(windows: &[FlowWindow], aborted: bool) -> Duration {
    if aborted {
        return NEUTRAL_WINDOW;
    }
    windows
        .iter()
        .map(FlowWindow::elapsed)
        .max()
        .filter(|d| !d.is_zero())
        .unwrap_or(NEUTRAL_WINDOW)
}

/// Receive/transmit byte and packet counters keyed by PID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowCounters {
    pub rx_bytes: HashMap<Pid, u64>,
    pub rx_packets: HashMap<Pid, u64>,
    pub tx_bytes: HashMap<Pid, u64>,
    pub tx_packets: HashMap<Pid, u64>,
}

impl FlowCounters {
    /// Zero-initialised counters for every candidate
    pub fn new(pids: &[Pid]) -> Self {
        let zeroed: HashMap<Pid, u64> = pids.iter().map(|&pid| (pid, 0)).collect();
        Self {
            rx_bytes: zeroed.clone(),
            rx_packets: zeroed.clone(),
            tx_bytes: zeroed.clone(),
            tx_packets: zeroed,
        }
    }

    /// Count one packet of `bytes` for `pid`.
    ///
    /// Returns false if `pid` is not a candidate; the key set never grows.
    pub fn record(&mut self, pid: Pid, direction: Direction, bytes: u64) -> bool {
        let (byte_map, packet_map) = match direction {
            Direction::Receive => (&mut self.rx_bytes, &mut self.rx_packets),
            Direction::Transmit => (&mut self.tx_bytes, &mut self.tx_packets),
        };

        match (byte_map.get_mut(&pid), packet_map.get_mut(&pid)) {
            (Some(b), Some(p)) => {
                *b = b.saturating_add(bytes);
                *p = p.saturating_add(1);
                true
            }
            _ => false,
        }
    }

    /// Add another shard's counts into this one
    pub fn merge(&mut self, other: &FlowCounters) {
        merge_map(&mut self.rx_bytes, &other.rx_bytes);
        merge_map(&mut self.rx_packets, &other.rx_packets);
        merge_map(&mut self.tx_bytes, &other.tx_bytes);
        merge_map(&mut self.tx_packets, &other.tx_packets);
    }

    pub fn total_packets(&self) -> u64 {
        self.rx_packets.values().sum::<u64>() + self.tx_packets.values().sum::<u64>()
    }

    /// Convert counts into per-second rates over `window`
    pub fn rates(&self, window: Duration) -> FlowRates {
        let window = if window.is_zero() {
            NEUTRAL_WINDOW
        } else {
            window
        };
        let secs = window.as_secs_f64();
        let per_sec = |map: &HashMap<Pid, u64>| -> HashMap<Pid, f64> {
            map.iter()
                .map(|(&pid, &count)| (pid, count as f64 / secs))
                .collect()
        };

        FlowRates {
            rx_bytes: per_sec(&self.rx_bytes),
            rx_packets: per_sec(&self.rx_packets),
            tx_bytes: per_sec(&self.tx_bytes),
            tx_packets: per_sec(&self.tx_packets),
            window,
        }
    }
}

fn merge_map(into: &mut HashMap<Pid, u64>, from: &HashMap<Pid, u64>) {
    for (pid, count) in from {
        if let Some(total) = into.get_mut(pid) {
            *total = total.saturating_add(*count);
        }
    }
}

/// Per-second rates for every candidate, plus the window used as divisor
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRates {
    pub rx_bytes: HashMap<Pid, f64>,
    pub rx_packets: HashMap<Pid, f64>,
    pub tx_bytes: HashMap<Pid, f64>,
    pub tx_packets: HashMap<Pid, f64>,
    pub window: Duration,
}
