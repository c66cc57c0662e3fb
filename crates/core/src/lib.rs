//! Host-side codecs for splitlink: KISS byte stuffing, the base64 wire text
//! carried over the radio, and header peeks used to classify IP traffic.

pub mod kiss;
pub mod packet;
pub mod text;
pub mod types;

pub use kiss::{KissCodec, KissDecoder};
pub use packet::{classify, IpPeek, RoutingTable, TcpPeek};
pub use types::{Frame, RadioAddress, TrafficClass};
