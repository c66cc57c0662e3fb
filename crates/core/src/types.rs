use std::fmt;

use serde::{Deserialize, Serialize};

/// One IP packet as exchanged with the host, optionally carrying a 4-byte
/// link-type prefix.
pub type Frame = Vec<u8>;

/// Radio module address (1-255).
pub type RadioAddress = u8;

/// Scheduling bucket assigned to a frame when it is enqueued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    /// Pure TCP acknowledgements.
    Urgent,
    /// TCP data and everything unrecognised.
    Normal,
    /// ICMP.
    Background,
}

impl TrafficClass {
    pub const ALL: [TrafficClass; 3] = [
        TrafficClass::Urgent,
        TrafficClass::Normal,
        TrafficClass::Background,
    ];
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficClass::Urgent => write!(f, "urgent"),
            TrafficClass::Normal => write!(f, "normal"),
            TrafficClass::Background => write!(f, "background"),
        }
    }
}
