//! UDP scan engine.
//!
//! UDP has no handshake, so the only definite answer is a negative one:
//! an ICMP (or ICMPv6) port-unreachable quoting our probe means the port
//! is closed. Silence is reported as open, which also covers ports whose
//! ICMP errors are filtered on the way back.

use crate::error::{Result, ScanError};
use crate::net::{Inbound, ProbeKind, TransportFactory, WaitOutcome};
use crate::packet::udp::build_udp_segment;
use crate::packet::{IcmpUnreachable, IpProtocol, Probe};
use crate::scanner::{PortReport, ProbeContext, ScanResult, Scanner};
use crate::types::{Port, Protocol, ScanTarget};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// UDP scanner for one target address.
pub struct UdpScanEngine<F> {
    target: IpAddr,
    context: ProbeContext<F>,
    payload_len: usize,
}

impl<F> Clone for UdpScanEngine<F> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            context: self.context.clone(),
            payload_len: self.payload_len,
        }
    }
}

impl<F: TransportFactory> UdpScanEngine<F> {
    /// `payload_len` zero bytes follow the UDP header of every probe.
    pub fn new(target: IpAddr, context: ProbeContext<F>, payload_len: usize) -> Self {
        Self {
            target,
            context,
            payload_len,
        }
    }

    /// Probe one port, blocking until it is classified. Never retries.
    pub fn probe(&self, port: Port) -> Result<PortReport> {
        let target = ScanTarget::new(self.target, port, Protocol::Udp);
        let ctx = &self.context;
        if ctx.cancel.is_cancelled() {
            return Ok(PortReport::new(target, ScanResult::Open));
        }

        let local = ctx.endpoint.local_address;
        let source_port = ctx.rng.source_port();
        let segment = build_udp_segment(source_port, port.as_u16(), &vec![0u8; self.payload_len])?;
        let probe = Probe::assemble(
            local,
            self.target,
            IpProtocol::Udp,
            &segment,
            source_port,
            ctx.rng.identification(),
        )?;

        let mut transport = ctx
            .factory
            .open(&ctx.endpoint, self.target, ProbeKind::UdpIcmp)?;
        let mut matcher = |inbound: &Inbound<'_>| {
            classify(inbound, local, self.target, port.as_u16(), source_port)
        };

        let started = Instant::now();
        transport.send(&probe.bytes, probe.destination)?;
        match transport.receive_with_timeout(&mut matcher, ctx.timeout) {
            WaitOutcome::Resolved(result) => {
                debug!(%target, %result, "classified");
                Ok(PortReport::new(target, result).with_response_time(started.elapsed()))
            }
            WaitOutcome::Unknown => {
                debug!(%target, "no port-unreachable, assuming open");
                Ok(PortReport::new(target, ScanResult::Open))
            }
        }
    }
}

/// Match an ICMP error against the UDP probe `local:source_port ->
/// target:dest_port`. Only a port-unreachable whose quoted datagram carries
/// all four values counts.
pub(crate) fn classify(
    inbound: &Inbound<'_>,
    local: IpAddr,
    target: IpAddr,
    dest_port: u16,
    source_port: u16,
) -> Option<ScanResult> {
    let unreachable = match inbound.protocol {
        IpProtocol::Icmp => IcmpUnreachable::parse_v4(inbound.payload)?,
        IpProtocol::Icmpv6 => IcmpUnreachable::parse_v6(inbound.payload)?,
        _ => return None,
    };
    let correlated = unreachable.embedded_protocol == IpProtocol::Udp.number()
        && unreachable.embedded_source == local
        && unreachable.embedded_destination == target
        && unreachable.embedded_source_port == source_port
        && unreachable.embedded_destination_port == dest_port;
    if !correlated {
        trace!(from = %inbound.source, "ICMP error for another datagram");
        return None;
    }
    if !unreachable.is_port_unreachable() {
        debug!(
            %target,
            port = dest_port,
            icmp_type = unreachable.icmp_type,
            code = unreachable.code,
            "non port-unreachable ICMP error"
        );
        return None;
    }
    Some(ScanResult::Closed)
}

#[async_trait]
impl<F: TransportFactory> Scanner for UdpScanEngine<F> {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    async fn scan_port(&self, port: Port) -> Result<PortReport> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.probe(port))
            .await
            .map_err(|e| ScanError::RawSocketError(format!("probe task failed: {}", e)))?
    }

    fn target(&self) -> IpAddr {
        self.target
    }

    fn timeout(&self) -> Duration {
        self.context.timeout
    }
}
