//! IPv4 header construction, pseudo-header checksums and inbound parsing.

use super::checksum::{checksum, fold, sum_words};
use super::{put_u16, transmitted_checksum, IpProtocol, PacketError};
use std::net::Ipv4Addr;

/// Length of an IPv4 header without options.
pub const HEADER_LEN: usize = 20;
/// Largest segment that still fits the 16-bit total-length field.
pub const MAX_SEGMENT_LEN: usize = u16::MAX as usize - HEADER_LEN;

const VERSION_IHL: u8 = 0x45;
const DEFAULT_TTL: u8 = 64;

/// Build a 20-byte IPv4 header followed by `segment`.
///
/// The upper-layer checksum is computed over the IPv4 pseudo-header and
/// written into the segment first; the header checksum covers the header
/// alone.
pub fn build_ipv4_packet(
    local: Ipv4Addr,
    target: Ipv4Addr,
    protocol: IpProtocol,
    segment: &[u8],
    identification: u16,
) -> Result<Vec<u8>, PacketError> {
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(PacketError::LengthOverflow {
            what: "IPv4 payload",
            len: segment.len(),
            max: MAX_SEGMENT_LEN,
        });
    }
    let offset = protocol.checksum_offset();
    if segment.len() < offset + 2 {
        return Err(PacketError::Truncated {
            what: "segment",
            len: segment.len(),
        });
    }

    let mut packet = vec![0u8; HEADER_LEN + segment.len()];
    packet[0] = VERSION_IHL;
    put_u16(&mut packet, 2, (HEADER_LEN + segment.len()) as u16);
    put_u16(&mut packet, 4, identification);
    // Flags and fragment offset (6..8) stay zero.
    packet[8] = DEFAULT_TTL;
    packet[9] = protocol.number();
    packet[12..16].copy_from_slice(&local.octets());
    packet[16..20].copy_from_slice(&target.octets());

    let header_sum = checksum(&packet[..HEADER_LEN]);
    put_u16(&mut packet, 10, header_sum);

    let body = &mut packet[HEADER_LEN..];
    body.copy_from_slice(segment);
    put_u16(body, offset, 0);
    let sum = pseudo_header_checksum(local, target, protocol, body)?;
    put_u16(body, offset, transmitted_checksum(protocol, sum));

    Ok(packet)
}

/// Checksum of `segment` prefixed by the 12-byte IPv4 pseudo-header
/// (source, destination, zero, protocol, segment length).
pub fn pseudo_header_checksum(
    local: Ipv4Addr,
    target: Ipv4Addr,
    protocol: IpProtocol,
    segment: &[u8],
) -> Result<u16, PacketError> {
    if segment.len() > u16::MAX as usize {
        return Err(PacketError::LengthOverflow {
            what: "IPv4 segment",
            len: segment.len(),
            max: u16::MAX as usize,
        });
    }
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&local.octets());
    pseudo[4..8].copy_from_slice(&target.octets());
    pseudo[9] = protocol.number();
    put_u16(&mut pseudo, 10, segment.len() as u16);

    // The pseudo-header is even-length, so summing the parts separately is
    // the same as summing their concatenation.
    Ok(!fold(sum_words(&pseudo) + sum_words(segment)))
}

/// The parts of an inbound IPv4 packet used for correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4View<'a> {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub payload: &'a [u8],
}

impl<'a> Ipv4View<'a> {
    /// Parse an IPv4 packet; `None` when it is not IPv4 or is truncated.
    pub fn parse(packet: &'a [u8]) -> Option<Self> {
        if packet.len() < HEADER_LEN || packet[0] >> 4 != 4 {
            return None;
        }
        let header_len = usize::from(packet[0] & 0x0F) * 4;
        if header_len < HEADER_LEN || packet.len() < header_len {
            return None;
        }
        // Trust the total-length field only when it is consistent; some
        // platforms hand raw sockets a host-order or stale value.
        let total = usize::from(u16::from_be_bytes([packet[2], packet[3]]));
        let end = if total >= header_len && total <= packet.len() {
            total
        } else {
            packet.len()
        };
        Some(Self {
            source: Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]),
            destination: Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]),
            protocol: packet[9],
            payload: &packet[header_len..end],
        })
    }
}
