//! Telemetry counters and the sink they are reported through

use std::time::Duration;
use log::info;
use serde::Serialize;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub frames_queued: u64,
    pub dropped_oversize: u64,
    pub dropped_full: u64,
    /// Normal entries pushed out by urgent traffic.
    pub evicted: u64,
    pub idle_cycles: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub rx_frames: u64,
    pub rx_bytes: u64,
    pub host_bytes_in: u64,
    pub host_frames_out: u64,
    pub rx_text_lines: u64,
    pub malformed_lines: u64,
    pub send_failures: u64,
    /// Frames for the host dropped because it stopped reading.
    pub host_write_timeouts: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    pub urgent: usize,
    pub normal: usize,
    pub background: usize,
}

impl QueueDepths {
    pub fn total(&self) -> usize {
        self.urgent + self.normal + self.background
    }
}

/// One periodic snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Telemetry {
    pub uptime: Duration,
    pub bridge: BridgeStats,
    pub scheduler: SchedulerStats,
    pub depths: QueueDepths,
}

pub trait TelemetrySink {
    fn emit(&mut self, telemetry: &Telemetry);
}

/// Writes each snapshot as a single `info` line.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn emit(&mut self, t: &Telemetry) {
        info!(
            "[t+{:.1}s] STATS: TX {}/{} RX {}/{} HOST {} KISS {} QACK={} QDAT={} QLO={} idle={} drop(oversize={} full={} evicted={}) malformed={} sendfail={} hoststall={}",
            t.uptime.as_secs_f64(),
            t.bridge.tx_frames,
            t.bridge.tx_bytes,
            t.bridge.rx_frames,
            t.bridge.rx_bytes,
            t.bridge.host_bytes_in,
            t.bridge.host_frames_out,
            t.depths.urgent,
            t.depths.normal,
            t.depths.background,
            t.scheduler.idle_cycles,
            t.scheduler.dropped_oversize,
            t.scheduler.dropped_full,
            t.scheduler.evicted,
            t.bridge.malformed_lines,
            t.bridge.send_failures,
            t.bridge.host_write_timeouts,
        );
    }
}

impl<F> TelemetrySink for F
where
    F: FnMut(&Telemetry),
{
    fn emit(&mut self, telemetry: &Telemetry) {
        self(telemetry)
    }
}
