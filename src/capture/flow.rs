//! Network/transport extraction for captured packets.
//!
//! The capture predicate guarantees where a ClientHello sits in the frame, not
//! that a TCP header is reachable by a plain decode: the Teredo and 6in4 shapes
//! carry TCP inside a second IP layer. Extraction therefore checks every layer
//! it needs and returns a [`SkipReason`] instead of assuming it is there.

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap::Linktype;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use super::engine::Packet;

const IP_PROTO_IPV6_IN_IPV4: u8 = 41;
const BSD_LOOPBACK_HEADER_LEN: usize = 4;
const LINUX_SLL_HEADER_LEN: usize = 16;
// DLT_RAW as reported by pcap_datalink on Linux and OpenBSD
const DLT_RAW_LINUX: Linktype = Linktype(12);
const DLT_RAW_OPENBSD: Linktype = Linktype(14);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IpVersion {
    IPv4,
    IPv6,
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::IPv4 => write!(f, "IPv4"),
            IpVersion::IPv6 => write!(f, "IPv6"),
        }
    }
}

/// How the TCP segment reached the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tunnel {
    None,
    Teredo,
    SixInFour,
}

impl fmt::Display for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tunnel::None => write!(f, "none"),
            Tunnel::Teredo => write!(f, "teredo"),
            Tunnel::SixInFour => write!(f, "6in4"),
        }
    }
}

/// Endpoints of a single observed segment. No state is kept across packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub ip_version: IpVersion,
    pub src_port: u16,
    pub dst_port: u16,
    pub tunnel: Tunnel,
}

/// Why a packet that passed the capture filter produced no flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Malformed(String),
    NoNetworkLayer,
    NoTransportLayer,
    UnsupportedTransport(String),
    EmptyPayload,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Malformed(e) => write!(f, "malformed packet: {}", e),
            SkipReason::NoNetworkLayer => write!(f, "no network layer"),
            SkipReason::NoTransportLayer => write!(f, "no transport layer"),
            SkipReason::UnsupportedTransport(t) => write!(f, "unsupported transport: {}", t),
            SkipReason::EmptyPayload => write!(f, "empty application payload"),
        }
    }
}

/// A flow plus the application bytes that follow the TCP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted<'a> {
    pub flow: Flow,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlowExtractor;

impl FlowExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract<'a>(&self, packet: &'a Packet) -> Result<Extracted<'a>, SkipReason> {
        let sliced = slice_link(packet.link_type, &packet.data)?;
        extract_sliced(sliced, Tunnel::None)
    }
}

fn slice_link(link_type: Linktype, data: &[u8]) -> Result<SlicedPacket<'_>, SkipReason> {
    let sliced = match link_type {
        Linktype::ETHERNET => SlicedPacket::from_ethernet(data),
        Linktype::NULL | Linktype::LOOP => {
            let ip = data
                .get(BSD_LOOPBACK_HEADER_LEN..)
                .ok_or(SkipReason::NoNetworkLayer)?;
            SlicedPacket::from_ip(ip)
        }
        Linktype::LINUX_SLL => {
            let ip = data
                .get(LINUX_SLL_HEADER_LEN..)
                .ok_or(SkipReason::NoNetworkLayer)?;
            SlicedPacket::from_ip(ip)
        }
        Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 | DLT_RAW_LINUX | DLT_RAW_OPENBSD => {
            SlicedPacket::from_ip(data)
        }
        other => {
            return Err(SkipReason::Malformed(format!(
                "unsupported link type {}",
                other.0
            )))
        }
    };
    sliced.map_err(|e| SkipReason::Malformed(e.to_string()))
}

fn extract_sliced(sliced: SlicedPacket<'_>, tunnel: Tunnel) -> Result<Extracted<'_>, SkipReason> {
    let (src_ip, dst_ip, ip_version, ip_proto, ip_payload) = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => (
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
            IpVersion::IPv4,
            ipv4.payload().ip_number.0,
            ipv4.payload().payload,
        ),
        Some(NetSlice::Ipv6(ipv6)) => (
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
            IpVersion::IPv6,
            ipv6.payload().ip_number.0,
            ipv6.payload().payload,
        ),
        _ => return Err(SkipReason::NoNetworkLayer),
    };

    match sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            let payload = tcp.payload();
            if payload.is_empty() {
                return Err(SkipReason::EmptyPayload);
            }
            Ok(Extracted {
                flow: Flow {
                    src_ip,
                    dst_ip,
                    ip_version,
                    src_port: tcp.source_port(),
                    dst_port: tcp.destination_port(),
                    tunnel,
                },
                payload,
            })
        }
        // Teredo: an IPv6 packet is the UDP payload
        Some(TransportSlice::Udp(udp)) if tunnel == Tunnel::None && starts_ipv6(udp.payload()) => {
            let inner = SlicedPacket::from_ip(udp.payload())
                .map_err(|e| SkipReason::Malformed(format!("teredo inner packet: {}", e)))?;
            extract_sliced(inner, Tunnel::Teredo)
        }
        Some(TransportSlice::Udp(_)) => {
            Err(SkipReason::UnsupportedTransport("udp".to_string()))
        }
        Some(_) => Err(SkipReason::UnsupportedTransport(format!("ip proto {}", ip_proto))),
        None if ip_proto == IP_PROTO_IPV6_IN_IPV4 && tunnel == Tunnel::None => {
            let inner = SlicedPacket::from_ip(ip_payload)
                .map_err(|e| SkipReason::Malformed(format!("6in4 inner packet: {}", e)))?;
            extract_sliced(inner, Tunnel::SixInFour)
        }
        None => Err(SkipReason::NoTransportLayer),
    }
}

fn starts_ipv6(data: &[u8]) -> bool {
    data.first().is_some_and(|b| b >> 4 == 6)
}
