//! TCP SYN scan engine.
//!
//! Sends a single SYN from a random ephemeral port and never completes the
//! handshake:
//!
//! - SYN/ACK: port is open
//! - RST: port is closed
//! - Nothing, twice: port is filtered
//!
//! A silent port gets exactly one retransmission of the identical segment.

use crate::error::{Result, ScanError};
use crate::net::{Inbound, ProbeKind, TransportFactory, WaitOutcome};
use crate::packet::tcp::{build_tcp_syn_segment, TcpHeader};
use crate::packet::{IpProtocol, Probe, TcpFlags};
use crate::scanner::{PortReport, ProbeContext, ScanResult, Scanner};
use crate::types::{Port, Protocol, ScanTarget};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::debug;

/// The SYN plus its one retry.
const MAX_ATTEMPTS: usize = 2;

/// SYN scanner for one target address.
///
/// **Requires elevated privileges (root/sudo).**
pub struct TcpScanEngine<F> {
    target: IpAddr,
    context: ProbeContext<F>,
}

impl<F> Clone for TcpScanEngine<F> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            context: self.context.clone(),
        }
    }
}

impl<F: TransportFactory> TcpScanEngine<F> {
    pub fn new(target: IpAddr, context: ProbeContext<F>) -> Self {
        Self { target, context }
    }

    /// Probe one port, blocking until it is classified.
    pub fn probe(&self, port: Port) -> Result<PortReport> {
        let target = ScanTarget::new(self.target, port, Protocol::Tcp);
        let ctx = &self.context;
        if ctx.cancel.is_cancelled() {
            return Ok(PortReport::new(target, ScanResult::Filtered));
        }

        let source_port = ctx.rng.source_port();
        let segment = build_tcp_syn_segment(source_port, port.as_u16(), ctx.rng.sequence());
        let probe = Probe::assemble(
            ctx.endpoint.local_address,
            self.target,
            IpProtocol::Tcp,
            &segment,
            source_port,
            ctx.rng.identification(),
        )?;

        let mut transport = ctx
            .factory
            .open(&ctx.endpoint, self.target, ProbeKind::TcpSyn)?;
        let mut matcher =
            |inbound: &Inbound<'_>| classify(inbound, self.target, port.as_u16(), source_port);

        let started = Instant::now();
        for attempt in 1..=MAX_ATTEMPTS {
            transport.send(&probe.bytes, probe.destination)?;
            match transport.receive_with_timeout(&mut matcher, ctx.timeout) {
                WaitOutcome::Resolved(result) => {
                    debug!(%target, %result, attempt, "classified");
                    return Ok(PortReport::new(target, result).with_response_time(started.elapsed()));
                }
                WaitOutcome::Unknown => debug!(%target, attempt, "no reply"),
            }
            if ctx.cancel.is_cancelled() {
                break;
            }
        }
        Ok(PortReport::new(target, ScanResult::Filtered))
    }
}

/// Classify a reply to the SYN sent from `source_port` to `dest_port`.
///
/// SYN/ACK is tested before RST. Anything else from the right peer is
/// logged and ignored.
pub(crate) fn classify(
    inbound: &Inbound<'_>,
    target: IpAddr,
    dest_port: u16,
    source_port: u16,
) -> Option<ScanResult> {
    if inbound.protocol != IpProtocol::Tcp || inbound.source != target {
        return None;
    }
    let header = TcpHeader::parse(inbound.payload)?;
    if header.source_port != dest_port || header.dest_port != source_port {
        return None;
    }
    if header.flags.contains(TcpFlags::SYN_ACK) {
        Some(ScanResult::Open)
    } else if header.flags.contains(TcpFlags::RST) {
        Some(ScanResult::Closed)
    } else {
        debug!(%target, port = dest_port, flags = %header.flags, "unexpected TCP flags");
        None
    }
}

#[async_trait]
impl<F: TransportFactory> Scanner for TcpScanEngine<F> {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
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
