//! Hand-built probe packets and parsers for the replies they provoke.
//!
//! Every builder here is pure: it takes addresses, ports and the randomised
//! values drawn from [`ProbeRng`], and returns bytes ready for the wire.
//! Parsers never fail loudly; a packet that is too short or of the wrong
//! kind simply yields `None` and is dropped by the caller.

pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod ipv6;
pub mod random;
pub mod tcp;
pub mod udp;

pub use checksum::checksum;
pub use icmp::IcmpUnreachable;
pub use random::ProbeRng;
pub use tcp::TcpFlags;

use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Errors raised by the packet builders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("{what} length {len} exceeds the maximum of {max}")]
    LengthOverflow {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{what} is too short: {len} bytes")]
    Truncated { what: &'static str, len: usize },

    #[error("source and destination address families differ")]
    FamilyMismatch,
}

/// Upper-layer protocols carried by our probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
    Icmpv6,
}

impl IpProtocol {
    /// IANA protocol number, used for both the IPv4 protocol field and the
    /// IPv6 next-header field.
    pub const fn number(self) -> u8 {
        match self {
            IpProtocol::Icmp => 1,
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Icmpv6 => 58,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(IpProtocol::Icmp),
            6 => Some(IpProtocol::Tcp),
            17 => Some(IpProtocol::Udp),
            58 => Some(IpProtocol::Icmpv6),
            _ => None,
        }
    }

    /// Byte offset of the checksum field inside this protocol's header.
    pub const fn checksum_offset(self) -> usize {
        match self {
            IpProtocol::Tcp => tcp::CHECKSUM_OFFSET,
            IpProtocol::Udp => udp::CHECKSUM_OFFSET,
            IpProtocol::Icmp | IpProtocol::Icmpv6 => 2,
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpProtocol::Icmp => write!(f, "icmp"),
            IpProtocol::Tcp => write!(f, "tcp"),
            IpProtocol::Udp => write!(f, "udp"),
            IpProtocol::Icmpv6 => write!(f, "icmpv6"),
        }
    }
}

/// A fully assembled probe, ready for [`RawTransport::send`].
///
/// For IPv4 the bytes include our own IP header; for IPv6 they are the bare
/// upper-layer segment and the kernel prepends the header.
///
/// [`RawTransport::send`]: crate::net::RawTransport::send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub bytes: Vec<u8>,
    pub destination: IpAddr,
    pub source_port: u16,
}

impl Probe {
    /// Turn a bare segment into wire bytes for `destination`.
    ///
    /// IPv4 gets a full header carrying `identification`; IPv6 gets its
    /// checksum filled in and is otherwise left to the kernel.
    pub fn assemble(
        local: IpAddr,
        destination: IpAddr,
        protocol: IpProtocol,
        segment: &[u8],
        source_port: u16,
        identification: u16,
    ) -> Result<Self, PacketError> {
        let bytes = match (local, destination) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                ipv4::build_ipv4_packet(src, dst, protocol, segment, identification)?
            }
            (IpAddr::V6(_), IpAddr::V6(_)) => {
                let mut bytes = segment.to_vec();
                finalize_segment(local, destination, protocol, &mut bytes)?;
                bytes
            }
            _ => return Err(PacketError::FamilyMismatch),
        };
        Ok(Self {
            bytes,
            destination,
            source_port,
        })
    }
}

/// Write a big-endian `u16` at `offset`.
#[inline]
pub(crate) fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

/// Read a big-endian `u16` at `offset`.
#[inline]
pub(crate) fn get_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Fill in the upper-layer checksum of `segment` for the given address pair,
/// choosing the IPv4 or IPv6 pseudo-header.
///
/// Only used for IPv6 probes and tests; IPv4 probes get their segment
/// checksum from [`ipv4::build_ipv4_packet`].
pub fn finalize_segment(
    local: IpAddr,
    target: IpAddr,
    protocol: IpProtocol,
    segment: &mut [u8],
) -> Result<(), PacketError> {
    let offset = protocol.checksum_offset();
    if segment.len() < offset + 2 {
        return Err(PacketError::Truncated {
            what: "segment",
            len: segment.len(),
        });
    }
    put_u16(segment, offset, 0);
    let sum = match (local, target) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => {
            ipv4::pseudo_header_checksum(src, dst, protocol, segment)?
        }
        (IpAddr::V6(src), IpAddr::V6(dst)) => {
            ipv6::pseudo_header_checksum(src, dst, protocol, segment)?
        }
        _ => return Err(PacketError::FamilyMismatch),
    };
    put_u16(segment, offset, transmitted_checksum(protocol, sum));
    Ok(())
}

/// A computed UDP checksum of zero means "no checksum" on the wire, so it is
/// sent as all ones instead (RFC 768).
pub(crate) fn transmitted_checksum(protocol: IpProtocol, sum: u16) -> u16 {
    if protocol == IpProtocol::Udp && sum == 0 {
        0xFFFF
    } else {
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_numbers() {
        assert_eq!(IpProtocol::Tcp.number(), 6);
        assert_eq!(IpProtocol::Udp.number(), 17);
        assert_eq!(IpProtocol::from_number(58), Some(IpProtocol::Icmpv6));
        assert_eq!(IpProtocol::from_number(2), None);
    }

    #[test]
    fn test_finalize_rejects_mixed_families() {
        let mut segment = udp::build_udp_segment(50000, 53, &[]).unwrap();
        let result = finalize_segment(
            "10.0.0.1".parse().unwrap(),
            "::1".parse().unwrap(),
            IpProtocol::Udp,
            &mut segment,
        );
        assert_eq!(result, Err(PacketError::FamilyMismatch));
    }

    #[test]
    fn test_assemble_sizes() {
        let segment = tcp::build_tcp_syn_segment(50000, 80, 9);
        let v4 = Probe::assemble(
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            IpProtocol::Tcp,
            &segment,
            50000,
            1,
        )
        .unwrap();
        assert_eq!(v4.bytes.len(), ipv4::HEADER_LEN + tcp::SYN_SEGMENT_LEN);
        assert!(checksum::verify(&v4.bytes[..ipv4::HEADER_LEN]));

        let v6 = Probe::assemble(
            "2001:db8::1".parse().unwrap(),
            "2001:db8::2".parse().unwrap(),
            IpProtocol::Tcp,
            &segment,
            50000,
            1,
        )
        .unwrap();
        assert_eq!(v6.bytes.len(), tcp::SYN_SEGMENT_LEN);
        assert_ne!(get_u16(&v6.bytes, tcp::CHECKSUM_OFFSET), 0);

        let mixed = Probe::assemble(
            "10.0.0.1".parse().unwrap(),
            "::1".parse().unwrap(),
            IpProtocol::Tcp,
            &segment,
            50000,
            1,
        );
        assert_eq!(mixed, Err(PacketError::FamilyMismatch));
    }

    #[test]
    fn test_zero_udp_checksum_is_sent_as_ones() {
        assert_eq!(transmitted_checksum(IpProtocol::Udp, 0), 0xFFFF);
        assert_eq!(transmitted_checksum(IpProtocol::Tcp, 0), 0);
        assert_eq!(transmitted_checksum(IpProtocol::Udp, 0x1234), 0x1234);
    }
}
