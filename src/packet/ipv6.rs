//! IPv6 pseudo-header checksums.
//!
//! There is no IPv6 header checksum; the kernel builds the header itself for
//! raw IPv6 sockets, so only the upper-layer checksum is ours to compute.

use super::checksum::{fold, sum_words};
use super::{IpProtocol, PacketError};
use std::net::Ipv6Addr;

/// Length of the IPv6 pseudo-header.
pub const PSEUDO_HEADER_LEN: usize = 40;
/// Length of a fixed IPv6 header.
pub const HEADER_LEN: usize = 40;

/// Checksum of `segment` prefixed by the 40-byte IPv6 pseudo-header
/// (source, destination, 32-bit upper-layer length, three zero bytes,
/// next header).
pub fn pseudo_header_checksum(
    local: Ipv6Addr,
    target: Ipv6Addr,
    protocol: IpProtocol,
    segment: &[u8],
) -> Result<u16, PacketError> {
    let len = u32::try_from(segment.len()).map_err(|_| PacketError::LengthOverflow {
        what: "IPv6 upper-layer packet",
        len: segment.len(),
        max: u32::MAX as usize,
    })?;

    let mut pseudo = [0u8; PSEUDO_HEADER_LEN];
    pseudo[0..16].copy_from_slice(&local.octets());
    pseudo[16..32].copy_from_slice(&target.octets());
    pseudo[32..36].copy_from_slice(&len.to_be_bytes());
    pseudo[39] = protocol.number();

    Ok(!fold(sum_words(&pseudo) + sum_words(segment)))
}
