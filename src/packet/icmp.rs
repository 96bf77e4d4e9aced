//! Parsing of ICMP and ICMPv6 destination-unreachable messages.
//!
//! Both variants echo the start of the offending datagram after an 8-byte
//! ICMP header; that echo is the only way to tie an error back to the probe
//! that caused it.

use super::ipv4::Ipv4View;
use super::{get_u16, ipv6, udp};
use std::net::{IpAddr, Ipv6Addr};

/// ICMPv4 destination unreachable.
pub const ICMP_DEST_UNREACHABLE: u8 = 3;
/// ICMPv4 code: port unreachable.
pub const ICMP_PORT_UNREACHABLE: u8 = 3;
/// ICMPv6 destination unreachable.
pub const ICMPV6_DEST_UNREACHABLE: u8 = 1;
/// ICMPv6 code: port unreachable.
pub const ICMPV6_PORT_UNREACHABLE: u8 = 4;

const ICMP_HEADER_LEN: usize = 8;

/// A destination-unreachable error and the probe it quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpUnreachable {
    pub icmp_type: u8,
    pub code: u8,
    pub embedded_source: IpAddr,
    pub embedded_destination: IpAddr,
    pub embedded_protocol: u8,
    pub embedded_source_port: u16,
    pub embedded_destination_port: u16,
}

impl IcmpUnreachable {
    /// Parse an ICMPv4 message (starting at the type byte).
    ///
    /// Returns `None` for any other message type, or when the quoted
    /// datagram stops short of a full 8-byte transport header.
    pub fn parse_v4(message: &[u8]) -> Option<Self> {
        if message.len() < ICMP_HEADER_LEN || message[0] != ICMP_DEST_UNREACHABLE {
            return None;
        }
        let quoted = Ipv4View::parse(&message[ICMP_HEADER_LEN..])?;
        if quoted.payload.len() < udp::HEADER_LEN {
            return None;
        }
        Some(Self {
            icmp_type: message[0],
            code: message[1],
            embedded_source: IpAddr::V4(quoted.source),
            embedded_destination: IpAddr::V4(quoted.destination),
            embedded_protocol: quoted.protocol,
            embedded_source_port: get_u16(quoted.payload, 0),
            embedded_destination_port: get_u16(quoted.payload, 2),
        })
    }

    /// Parse an ICMPv6 message (starting at the type byte).
    pub fn parse_v6(message: &[u8]) -> Option<Self> {
        let transport = ICMP_HEADER_LEN + ipv6::HEADER_LEN;
        if message.len() < transport + udp::HEADER_LEN || message[0] != ICMPV6_DEST_UNREACHABLE {
            return None;
        }
        let quoted = &message[ICMP_HEADER_LEN..];
        if quoted[0] >> 4 != 6 {
            return None;
        }
        let source: [u8; 16] = quoted[8..24].try_into().ok()?;
        let destination: [u8; 16] = quoted[24..40].try_into().ok()?;
        Some(Self {
            icmp_type: message[0],
            code: message[1],
            embedded_source: IpAddr::V6(Ipv6Addr::from(source)),
            embedded_destination: IpAddr::V6(Ipv6Addr::from(destination)),
            embedded_protocol: quoted[6],
            embedded_source_port: get_u16(message, transport),
            embedded_destination_port: get_u16(message, transport + 2),
        })
    }

    /// True for the port-unreachable code of either ICMP version.
    pub fn is_port_unreachable(&self) -> bool {
        match self.embedded_destination {
            IpAddr::V4(_) => {
                self.icmp_type == ICMP_DEST_UNREACHABLE && self.code == ICMP_PORT_UNREACHABLE
            }
            IpAddr::V6(_) => {
                self.icmp_type == ICMPV6_DEST_UNREACHABLE && self.code == ICMPV6_PORT_UNREACHABLE
            }
        }
    }
}
