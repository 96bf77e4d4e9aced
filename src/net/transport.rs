//! Raw packet transports.
//!
//! A transport is opened per scan operation, sends that operation's probe
//! and waits a bounded time for a reply the caller's matcher accepts. Every
//! transport normalises inbound traffic to an [`Inbound`] whose payload
//! starts at the upper-layer header, so matchers never deal with IP
//! headers.

use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr, SocketAddrV6};
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, trace};

use super::address::{is_unicast_link_local, AddressContext, NetworkEndpointContext};
use super::datalink::LinkTransport;
use super::{AddressFamily, CancelToken, READ_SLICE};
use crate::error::{Result, ScanError};
use crate::packet::ipv4::Ipv4View;
use crate::packet::IpProtocol;
use crate::scanner::ScanResult;

const RECV_BUFFER_LEN: usize = 65536;

/// One received packet, stripped to its upper-layer header.
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'a> {
    /// Address the packet came from.
    pub source: IpAddr,
    /// Protocol of `payload` (TCP, ICMP or ICMPv6).
    pub protocol: IpProtocol,
    pub payload: &'a [u8],
}

/// Result of one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Resolved(ScanResult),
    /// Nothing correlated arrived before the deadline.
    Unknown,
}

/// Decides whether an inbound packet answers our probe.
pub type MatchFn<'a> = dyn FnMut(&Inbound<'_>) -> Option<ScanResult> + 'a;

/// Sends probes and waits for correlated replies.
pub trait RawTransport: Send {
    fn send(&mut self, packet: &[u8], destination: IpAddr) -> Result<()>;

    /// Read until `matcher` accepts a packet or `timeout` elapses.
    ///
    /// Uncorrelated packets are discarded. Receive errors end the wait as
    /// [`WaitOutcome::Unknown`].
    fn receive_with_timeout(&mut self, matcher: &mut MatchFn<'_>, timeout: Duration)
        -> WaitOutcome;
}

/// What kind of reply a transport must be able to hear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// TCP SYN out, SYN-ACK or RST back.
    TcpSyn,
    /// UDP out, ICMP port-unreachable back.
    UdpIcmp,
}

impl ProbeKind {
    pub const fn outbound_protocol(self) -> IpProtocol {
        match self {
            ProbeKind::TcpSyn => IpProtocol::Tcp,
            ProbeKind::UdpIcmp => IpProtocol::Udp,
        }
    }

    pub const fn inbound_protocol(self, family: AddressFamily) -> IpProtocol {
        match (self, family) {
            (ProbeKind::TcpSyn, _) => IpProtocol::Tcp,
            (ProbeKind::UdpIcmp, AddressFamily::V4) => IpProtocol::Icmp,
            (ProbeKind::UdpIcmp, AddressFamily::V6) => IpProtocol::Icmpv6,
        }
    }
}

/// Opens one transport per scan operation.
pub trait TransportFactory: Send + Sync + 'static {
    fn open(
        &self,
        endpoint: &NetworkEndpointContext,
        destination: IpAddr,
        kind: ProbeKind,
    ) -> Result<Box<dyn RawTransport>>;
}

/// Raw sockets, or the link layer when a context for next-hop resolution
/// is supplied.
#[derive(Debug, Clone)]
pub struct SystemTransportFactory {
    cancel: CancelToken,
    link_layer: Option<Arc<AddressContext>>,
}

impl SystemTransportFactory {
    pub fn raw_sockets(cancel: CancelToken) -> Self {
        Self {
            cancel,
            link_layer: None,
        }
    }

    pub fn link_layer(cancel: CancelToken, context: Arc<AddressContext>) -> Self {
        Self {
            cancel,
            link_layer: Some(context),
        }
    }
}

impl TransportFactory for SystemTransportFactory {
    fn open(
        &self,
        endpoint: &NetworkEndpointContext,
        destination: IpAddr,
        kind: ProbeKind,
    ) -> Result<Box<dyn RawTransport>> {
        match &self.link_layer {
            Some(context) => {
                if destination.is_ipv6() {
                    return Err(ScanError::UnsupportedFamily(destination));
                }
                let local_mac = endpoint.local_hardware_address.ok_or_else(|| {
                    ScanError::InvalidConfig(format!(
                        "interface {} has no MAC address",
                        endpoint.interface.name
                    ))
                })?;
                let peer_mac = context.resolve_hardware_address(destination, &endpoint.interface)?;
                let transport = LinkTransport::open(
                    &endpoint.interface,
                    local_mac,
                    peer_mac,
                    self.cancel.clone(),
                    |iface, config| context.open_channel(iface, config),
                )?;
                Ok(Box::new(transport))
            }
            None => Ok(Box::new(SocketTransport::open(
                endpoint.local_address,
                endpoint.interface.index,
                kind,
                self.cancel.clone(),
            )?)),
        }
    }
}

/// Raw IP sockets via `socket2`.
///
/// IPv4 probes carry our own IP header (`IP_HDRINCL`); IPv6 probes are bare
/// segments and the kernel adds the header. The listening socket is opened
/// together with the sending one, before anything is sent.
///
/// Link-local IPv6 addresses are only meaningful together with the index of
/// the interface they live on; `scope_id` is that index.
pub struct SocketTransport {
    sender: Socket,
    /// Separate listener for ICMP; `None` when the sender hears replies too.
    listener: Option<Socket>,
    family: AddressFamily,
    scope_id: u32,
    inbound_protocol: IpProtocol,
    cancel: CancelToken,
    buffer: Box<[MaybeUninit<u8>]>,
}

impl SocketTransport {
    pub fn open(
        local: IpAddr,
        scope_id: u32,
        kind: ProbeKind,
        cancel: CancelToken,
    ) -> Result<Self> {
        let family = AddressFamily::of(local);
        let domain = match family {
            AddressFamily::V4 => Domain::IPV4,
            AddressFamily::V6 => Domain::IPV6,
        };

        let sender = raw_socket(domain, kind.outbound_protocol())?;
        match family {
            AddressFamily::V4 => sender
                .set_header_included_v4(true)
                .map_err(ScanError::from_socket)?,
            // Pins the kernel's choice of source address to the one our
            // pseudo-header checksum was computed with.
            AddressFamily::V6 => sender
                .bind(&SockAddr::from(raw_socket_address(local, scope_id)))
                .map_err(ScanError::from_socket)?,
        }

        let inbound_protocol = kind.inbound_protocol(family);
        let listener = match kind {
            ProbeKind::TcpSyn => None,
            ProbeKind::UdpIcmp => Some(raw_socket(domain, inbound_protocol)?),
        };

        Ok(Self {
            sender,
            listener,
            family,
            scope_id,
            inbound_protocol,
            cancel,
            buffer: vec![MaybeUninit::uninit(); RECV_BUFFER_LEN].into_boxed_slice(),
        })
    }
}

/// Port-less socket address for a raw socket. Link-local IPv6 addresses get
/// `scope_id`; the kernel rejects them without one.
fn raw_socket_address(ip: IpAddr, scope_id: u32) -> SocketAddr {
    match ip {
        IpAddr::V6(v6) if is_unicast_link_local(&v6) => {
            SocketAddr::V6(SocketAddrV6::new(v6, 0, 0, scope_id))
        }
        _ => SocketAddr::new(ip, 0),
    }
}

fn raw_socket(domain: Domain, protocol: IpProtocol) -> Result<Socket> {
    let protocol = match protocol {
        IpProtocol::Tcp => Protocol::TCP,
        IpProtocol::Udp => Protocol::UDP,
        IpProtocol::Icmp => Protocol::ICMPV4,
        IpProtocol::Icmpv6 => Protocol::ICMPV6,
    };
    Socket::new_raw(domain, Type::RAW, Some(protocol)).map_err(ScanError::from_socket)
}

impl RawTransport for SocketTransport {
    fn send(&mut self, packet: &[u8], destination: IpAddr) -> Result<()> {
        // Raw sockets ignore the port; IPv6 requires it to be zero.
        let address = SockAddr::from(raw_socket_address(destination, self.scope_id));
        self.sender
            .send_to(packet, &address)
            .map_err(ScanError::from_socket)?;
        trace!(%destination, len = packet.len(), "probe sent");
        Ok(())
    }

    fn receive_with_timeout(
        &mut self,
        matcher: &mut MatchFn<'_>,
        timeout: Duration,
    ) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return WaitOutcome::Unknown;
            }
            if self.cancel.is_cancelled() {
                debug!("wait cancelled");
                return WaitOutcome::Unknown;
            }

            let socket = self.listener.as_ref().unwrap_or(&self.sender);
            // A zero read timeout would block forever.
            let slice = remaining.min(READ_SLICE).max(Duration::from_millis(1));
            if let Err(e) = socket.set_read_timeout(Some(slice)) {
                debug!(error = %e, "could not arm receive timeout");
                return WaitOutcome::Unknown;
            }

            let (len, from) = match socket.recv_from(&mut self.buffer) {
                Ok(received) => received,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock
                            | std::io::ErrorKind::TimedOut
                            | std::io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => {
                    debug!(error = %e, "receive failed, giving up on this wait");
                    return WaitOutcome::Unknown;
                }
            };

            // SAFETY: `recv_from` initialised the first `len` bytes of the
            // buffer, and `len` never exceeds its length.
            let datagram: &[u8] =
                unsafe { std::slice::from_raw_parts(self.buffer.as_ptr().cast::<u8>(), len) };

            let inbound = match self.family {
                // IPv4 raw sockets deliver the IP header as well.
                AddressFamily::V4 => {
                    let Some(view) = Ipv4View::parse(datagram) else {
                        continue;
                    };
                    if view.protocol != self.inbound_protocol.number() {
                        continue;
                    }
                    Inbound {
                        source: IpAddr::V4(view.source),
                        protocol: self.inbound_protocol,
                        payload: view.payload,
                    }
                }
                AddressFamily::V6 => {
                    let Some(source) = from.as_socket().map(|addr| addr.ip()) else {
                        continue;
                    };
                    Inbound {
                        source,
                        protocol: self.inbound_protocol,
                        payload: datagram,
                    }
                }
            };

            if let Some(result) = matcher(&inbound) {
                return WaitOutcome::Resolved(result);
            }
            trace!(source = %inbound.source, "uncorrelated packet discarded");
        }
    }
}
