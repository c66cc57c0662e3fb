//! Read-only IP/TCP header peeks
//!
//! Nothing here parses the full stack. Frames are looked at just far enough
//! to pick a [`TrafficClass`] and a destination address. Truncated input
//! falls back to [`IpPeek::Short`] instead of failing.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::{RadioAddress, TrafficClass};

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_ICMPV6: u8 = 58;

const TCP_FLAG_ACK: u8 = 0x10;
const LINK_PREFIX_LEN: usize = 4;
const IPV4_MIN_HEADER: usize = 20;
const IPV6_HEADER: usize = 40;
const TCP_MIN_HEADER: usize = 20;

/// Offset of the IP header, skipping a `00 00 08 00` / `00 00 86 DD` tag.
pub fn link_offset(frame: &[u8]) -> usize {
    match frame {
        [0x00, 0x00, 0x08, 0x00, ..] | [0x00, 0x00, 0x86, 0xDD, ..] => LINK_PREFIX_LEN,
        _ => 0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpPeek {
    Short,
    Header(IpHeader),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpHeader {
    /// Offset of the IP header inside the frame.
    pub offset: usize,
    pub version: u8,
    pub header_len: usize,
    pub total_len: usize,
    pub protocol: u8,
    pub src: IpAddr,
    pub dst: IpAddr,
}

impl IpPeek {
    pub fn header(&self) -> Option<&IpHeader> {
        match self {
            IpPeek::Short => None,
            IpPeek::Header(h) => Some(h),
        }
    }

    pub fn destination(&self) -> Option<IpAddr> {
        self.header().map(|h| h.dst)
    }
}

impl fmt::Display for IpPeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpPeek::Short => write!(f, "short"),
            IpPeek::Header(h) => write!(
                f,
                "v{} ihl={} tot={} proto={} {}->{}",
                h.version, h.header_len, h.total_len, h.protocol, h.src, h.dst
            ),
        }
    }
}

pub fn peek_ip(frame: &[u8]) -> IpPeek {
    let off = link_offset(frame);
    let Some(ip) = frame.get(off..) else {
        return IpPeek::Short;
    };
    if ip.len() < IPV4_MIN_HEADER {
        return IpPeek::Short;
    }

    let version = ip[0] >> 4;
    if version == 6 && ip.len() >= IPV6_HEADER {
        let payload_len = u16::from_be_bytes([ip[4], ip[5]]) as usize;
        let mut src = [0u8; 16];
        let mut dst = [0u8; 16];
        src.copy_from_slice(&ip[8..24]);
        dst.copy_from_slice(&ip[24..40]);
        return IpPeek::Header(IpHeader {
            offset: off,
            version,
            header_len: IPV6_HEADER,
            total_len: IPV6_HEADER + payload_len,
            protocol: ip[6],
            src: IpAddr::V6(Ipv6Addr::from(src)),
            dst: IpAddr::V6(Ipv6Addr::from(dst)),
        });
    }

    IpPeek::Header(IpHeader {
        offset: off,
        version,
        header_len: (ip[0] & 0x0F) as usize * 4,
        total_len: u16::from_be_bytes([ip[2], ip[3]]) as usize,
        protocol: ip[9],
        src: IpAddr::V4(Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15])),
        dst: IpAddr::V4(Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19])),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TcpPeek {
    pub flags: u8,
    pub data_offset: usize,
    pub data_len: usize,
}

impl TcpPeek {
    pub fn is_pure_ack(&self) -> bool {
        self.flags & TCP_FLAG_ACK != 0 && self.data_len == 0
    }
}

/// Peek the TCP header following `ip`. `None` when the segment is cut short.
pub fn peek_tcp(frame: &[u8], ip: &IpHeader) -> Option<TcpPeek> {
    let start = ip.offset + ip.header_len;
    let tcp = frame.get(start..)?;
    if tcp.len() < TCP_MIN_HEADER {
        return None;
    }
    let data_offset = (tcp[12] >> 4) as usize * 4;
    if tcp.len() < data_offset {
        return None;
    }
    Some(TcpPeek {
        flags: tcp[13],
        data_offset,
        data_len: ip.total_len.saturating_sub(ip.header_len + data_offset),
    })
}

pub fn classify(frame: &[u8]) -> TrafficClass {
    let IpPeek::Header(ip) = peek_ip(frame) else {
        return TrafficClass::Normal;
    };
    match ip.protocol {
        PROTO_ICMP | PROTO_ICMPV6 => TrafficClass::Background,
        PROTO_TCP => match peek_tcp(frame, &ip) {
            Some(tcp) if tcp.is_pure_ack() => TrafficClass::Urgent,
            _ => TrafficClass::Normal,
        },
        _ => TrafficClass::Normal,
    }
}

/// Static destination IP to radio address map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    pub default_peer: RadioAddress,
    #[serde(default)]
    pub routes: BTreeMap<IpAddr, RadioAddress>,
}

impl RoutingTable {
    pub fn new(default_peer: RadioAddress) -> Self {
        Self {
            default_peer,
            routes: BTreeMap::new(),
        }
    }

    pub fn with_route(mut self, ip: IpAddr, addr: RadioAddress) -> Self {
        self.routes.insert(ip, addr);
        self
    }

    pub fn lookup(&self, dst: Option<IpAddr>) -> RadioAddress {
        dst.and_then(|ip| self.routes.get(&ip).copied())
            .unwrap_or(self.default_peer)
    }

    /// Radio address for `frame`, falling back to the default peer.
    pub fn resolve(&self, frame: &[u8]) -> RadioAddress {
        self.lookup(peek_ip(frame).destination())
    }
}
