//! TCP SYN segment construction and reply parsing.

use super::{get_u16, put_u16};
use std::fmt;
use std::ops::BitOr;

/// Length of the SYN segment we send: 20-byte header plus one MSS option.
pub const SYN_SEGMENT_LEN: usize = 24;
/// Minimum TCP header length.
pub const MIN_HEADER_LEN: usize = 20;
/// Offset of the checksum field in the TCP header.
pub const CHECKSUM_OFFSET: usize = 16;

const FLAGS_OFFSET: usize = 13;
const DEFAULT_WINDOW: u16 = 64240;
const MSS_KIND: u8 = 2;
const MSS_LENGTH: u8 = 4;
const MSS_VALUE: u16 = 1460;

/// TCP control bits as carried in byte 13 of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: Self = Self(0x01);
    pub const SYN: Self = Self(0x02);
    pub const RST: Self = Self(0x04);
    pub const PSH: Self = Self(0x08);
    pub const ACK: Self = Self(0x10);
    pub const URG: Self = Self(0x20);
    pub const ECE: Self = Self(0x40);
    pub const CWR: Self = Self(0x80);
    /// The reply pattern of a listening port.
    pub const SYN_ACK: Self = Self(0x12);

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when every bit of `other` is set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TcpFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TcpFlags, &str); 8] = [
            (TcpFlags::FIN, "FIN"),
            (TcpFlags::SYN, "SYN"),
            (TcpFlags::RST, "RST"),
            (TcpFlags::PSH, "PSH"),
            (TcpFlags::ACK, "ACK"),
            (TcpFlags::URG, "URG"),
            (TcpFlags::ECE, "ECE"),
            (TcpFlags::CWR, "CWR"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "0x{:02X}", self.0)
        } else {
            write!(f, "{}", set.join("|"))
        }
    }
}

/// Build a 24-byte SYN segment with an MSS option.
///
/// The checksum is left zero; it depends on the pseudo-header and is filled
/// in by the IP-layer builder.
pub fn build_tcp_syn_segment(
    source_port: u16,
    dest_port: u16,
    sequence: u32,
) -> [u8; SYN_SEGMENT_LEN] {
    let mut segment = [0u8; SYN_SEGMENT_LEN];
    put_u16(&mut segment, 0, source_port);
    put_u16(&mut segment, 2, dest_port);
    segment[4..8].copy_from_slice(&sequence.to_be_bytes());
    // Acknowledgment number stays zero.
    segment[12] = ((SYN_SEGMENT_LEN / 4) as u8) << 4;
    segment[FLAGS_OFFSET] = TcpFlags::SYN.bits();
    put_u16(&mut segment, 14, DEFAULT_WINDOW);
    // Checksum (16..18) and urgent pointer (18..20) stay zero.
    segment[20] = MSS_KIND;
    segment[21] = MSS_LENGTH;
    put_u16(&mut segment, 22, MSS_VALUE);
    segment
}

/// The fields of an inbound TCP header that matter for correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub dest_port: u16,
    pub flags: TcpFlags,
}

impl TcpHeader {
    /// Parse the fixed part of a TCP header; `None` when truncated.
    pub fn parse(segment: &[u8]) -> Option<Self> {
        if segment.len() < MIN_HEADER_LEN {
            return None;
        }
        Some(Self {
            source_port: get_u16(segment, 0),
            dest_port: get_u16(segment, 2),
            flags: TcpFlags::from_bits(segment[FLAGS_OFFSET]),
        })
    }
}
