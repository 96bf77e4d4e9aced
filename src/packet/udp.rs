//! UDP segment construction.

use super::{put_u16, PacketError};

/// Length of the UDP header.
pub const HEADER_LEN: usize = 8;
/// Offset of the checksum field in the UDP header.
pub const CHECKSUM_OFFSET: usize = 6;
/// Largest payload whose length still fits the 16-bit length field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - HEADER_LEN;

/// Build an 8-byte UDP header followed by `payload`.
///
/// The checksum is left zero for the IP-layer builder to fill in.
pub fn build_udp_segment(
    source_port: u16,
    dest_port: u16,
    payload: &[u8],
) -> Result<Vec<u8>, PacketError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(PacketError::LengthOverflow {
            what: "UDP payload",
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut segment = vec![0u8; HEADER_LEN + payload.len()];
    put_u16(&mut segment, 0, source_port);
    put_u16(&mut segment, 2, dest_port);
    put_u16(&mut segment, 4, (HEADER_LEN + payload.len()) as u16);
    segment[HEADER_LEN..].copy_from_slice(payload);
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::udp::UdpPacket;
    use pnet::packet::Packet;

    #[test]
    fn test_empty_probe() {
        let segment = build_udp_segment(50001, 53, &[]).unwrap();
        assert_eq!(segment.len(), 8);

        let udp = UdpPacket::new(&segment).unwrap();
        assert_eq!(udp.get_source(), 50001);
        assert_eq!(udp.get_destination(), 53);
        assert_eq!(udp.get_length(), 8);
        assert_eq!(udp.get_checksum(), 0);
    }

    #[test]
    fn test_payload_is_appended() {
        let segment = build_udp_segment(50001, 161, &[0, 0, 0, 0]).unwrap();
        assert_eq!(segment.len(), 12);
        let udp = UdpPacket::new(&segment).unwrap();
        assert_eq!(udp.get_length(), 12);
        assert_eq!(udp.payload(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let err = build_udp_segment(1, 2, &payload).unwrap_err();
        assert!(matches!(err, PacketError::LengthOverflow { .. }));

        let payload = vec![0u8; MAX_PAYLOAD_LEN];
        let segment = build_udp_segment(1, 2, &payload).unwrap();
        assert_eq!(segment.len(), u16::MAX as usize);
    }
}
