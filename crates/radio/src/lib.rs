//! radio-side scheduling for splitlink

use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use splitlink_core::{text, TrafficClass};

pub mod scheduler;
pub mod stats;
pub mod wire;

pub use scheduler::{QueueEntry, RadioScheduler};
pub use stats::{BridgeStats, LogSink, QueueDepths, SchedulerStats, Telemetry, TelemetrySink};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RadioError {
    #[error("frame of {len} bytes exceeds raw limit of {limit} bytes")]
    OversizeFrame { len: usize, limit: usize },

    #[error("wire text of {len} chars exceeds radio limit of {max} chars")]
    OversizeWireText { len: usize, max: usize },

    #[error("{class} queue full")]
    QueueFull { class: TrafficClass },

    #[error("malformed wire text: {0}")]
    MalformedWireText(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Longest payload accepted by a single `AT+SEND`.
    pub max_ascii: usize,
    pub wire_prefix: String,
    pub host_mtu: usize,
    /// Allowance on top of `host_mtu` for the link-type tag.
    pub mtu_slack: usize,
    pub urgent_capacity: usize,
    pub normal_capacity: usize,
    pub background_capacity: usize,
    pub min_tx_interval: Duration,
}

impl RadioConfig {
    /// Largest raw frame admitted to the queues.
    pub fn raw_limit(&self) -> usize {
        text::raw_limit(self.max_ascii, self.wire_prefix.len()).min(self.host_mtu + self.mtu_slack)
    }

    pub fn capacity(&self, class: TrafficClass) -> usize {
        match class {
            TrafficClass::Urgent => self.urgent_capacity,
            TrafficClass::Normal => self.normal_capacity,
            TrafficClass::Background => self.background_capacity,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            max_ascii: 220,
            wire_prefix: "B:".to_string(),
            host_mtu: 156,
            mtu_slack: 4,
            urgent_capacity: 12,
            normal_capacity: 16,
            background_capacity: 4,
            min_tx_interval: Duration::from_millis(1300),
        }
    }
}
