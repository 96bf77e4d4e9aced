//! Ethernet framing and ARP request/reply handling.
//!
//! Only needed when probes are injected at the link layer, where we must
//! supply the frame header and know the next hop's hardware address.

use super::PacketError;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

/// Length of an Ethernet II header.
pub const ETH_HEADER_LEN: usize = 14;
/// Length of an IPv4-over-Ethernet ARP body.
pub const ARP_LEN: usize = 28;
/// Minimum Ethernet frame size without the frame check sequence.
pub const MIN_FRAME_LEN: usize = 60;

/// Wrap an IPv4 packet in an Ethernet II frame.
pub fn wrap_ipv4(
    source: MacAddr,
    destination: MacAddr,
    packet: &[u8],
) -> Result<Vec<u8>, PacketError> {
    let mut frame = vec![0u8; (ETH_HEADER_LEN + packet.len()).max(MIN_FRAME_LEN)];
    {
        let mut eth = MutableEthernetPacket::new(&mut frame).ok_or(PacketError::Truncated {
            what: "Ethernet frame",
            len: ETH_HEADER_LEN + packet.len(),
        })?;
        eth.set_destination(destination);
        eth.set_source(source);
        eth.set_ethertype(EtherTypes::Ipv4);
    }
    frame[ETH_HEADER_LEN..ETH_HEADER_LEN + packet.len()].copy_from_slice(packet);
    Ok(frame)
}

/// The IPv4 payload of an Ethernet frame, if it carries one.
pub fn ipv4_payload(frame: &[u8]) -> Option<&[u8]> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    Some(&frame[ETH_HEADER_LEN..])
}

/// Build a broadcast ARP request asking who has `target`.
pub fn arp_request(
    source_mac: MacAddr,
    source_ip: Ipv4Addr,
    target: Ipv4Addr,
) -> Result<Vec<u8>, PacketError> {
    let mut frame = vec![0u8; MIN_FRAME_LEN];
    {
        let mut eth = MutableEthernetPacket::new(&mut frame).ok_or(PacketError::Truncated {
            what: "Ethernet frame",
            len: MIN_FRAME_LEN,
        })?;
        eth.set_destination(MacAddr::broadcast());
        eth.set_source(source_mac);
        eth.set_ethertype(EtherTypes::Arp);
    }

    let mut arp = MutableArpPacket::new(&mut frame[ETH_HEADER_LEN..ETH_HEADER_LEN + ARP_LEN])
        .ok_or(PacketError::Truncated {
            what: "ARP packet",
            len: ARP_LEN,
        })?;
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(ArpOperations::Request);
    arp.set_sender_hw_addr(source_mac);
    arp.set_sender_proto_addr(source_ip);
    arp.set_target_hw_addr(MacAddr::zero());
    arp.set_target_proto_addr(target);
    Ok(frame)
}

/// If `frame` is an ARP reply from `target`, return the hardware address
/// it announces.
pub fn arp_reply_from(frame: &[u8], target: Ipv4Addr) -> Option<MacAddr> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_operation() != ArpOperations::Reply || arp.get_sender_proto_addr() != target {
        return None;
    }
    Some(arp.get_sender_hw_addr())
}
