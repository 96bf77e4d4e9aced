//! Link-layer delivery through a `pnet` datalink handle.
//!
//! Used when IP-level raw sockets are not wanted: we build the Ethernet
//! frame ourselves and read whole frames back. IPv4 only.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use pnet::datalink::{Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::util::MacAddr;
use tracing::{debug, trace};

use super::transport::{Inbound, MatchFn, RawTransport, WaitOutcome};
use super::{CancelToken, READ_SLICE};
use crate::error::{Result, ScanError};
use crate::packet::ethernet::{ipv4_payload, wrap_ipv4};
use crate::packet::ipv4::Ipv4View;
use crate::packet::IpProtocol;

/// Open an Ethernet channel on `iface` with the given opener.
///
/// The opener is `pnet::datalink::channel` in production and a dummy
/// channel in tests.
pub(crate) fn open_ethernet_channel<F>(
    iface: &NetworkInterface,
    config: Config,
    opener: F,
) -> Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>)>
where
    F: FnOnce(&NetworkInterface, Config) -> std::io::Result<Channel>,
{
    match opener(iface, config).map_err(ScanError::from_socket)? {
        Channel::Ethernet(tx, rx) => Ok((tx, rx)),
        _ => Err(ScanError::RawSocketError(format!(
            "non-ethernet channel for {}",
            iface.name
        ))),
    }
}

/// Transport that injects and captures Ethernet frames.
pub struct LinkTransport {
    tx: Box<dyn DataLinkSender>,
    rx: Box<dyn DataLinkReceiver>,
    local_mac: MacAddr,
    peer_mac: MacAddr,
    cancel: CancelToken,
}

impl LinkTransport {
    /// Open a capture/injection handle towards `peer_mac`.
    pub fn open<F>(
        iface: &NetworkInterface,
        local_mac: MacAddr,
        peer_mac: MacAddr,
        cancel: CancelToken,
        opener: F,
    ) -> Result<Self>
    where
        F: FnOnce(&NetworkInterface, Config) -> std::io::Result<Channel>,
    {
        let config = Config {
            read_timeout: Some(READ_SLICE),
            ..Default::default()
        };
        let (tx, rx) = open_ethernet_channel(iface, config, opener)?;
        Ok(Self {
            tx,
            rx,
            local_mac,
            peer_mac,
            cancel,
        })
    }
}

impl RawTransport for LinkTransport {
    fn send(&mut self, packet: &[u8], destination: IpAddr) -> Result<()> {
        if destination.is_ipv6() {
            return Err(ScanError::UnsupportedFamily(destination));
        }
        let frame = wrap_ipv4(self.local_mac, self.peer_mac, packet)?;
        match self.tx.send_to(&frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(ScanError::from_socket(e)),
            None => Err(ScanError::RawSocketError(
                "datalink handle refused the frame".to_string(),
            )),
        }
    }

    fn receive_with_timeout(&mut self, matcher: &mut MatchFn<'_>, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.cancel.is_cancelled() {
                debug!("wait cancelled");
                return WaitOutcome::Unknown;
            }
            let frame = match self.rx.next() {
                Ok(frame) => frame,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    continue
                }
                Err(e) => {
                    debug!(error = %e, "capture failed, giving up on this wait");
                    return WaitOutcome::Unknown;
                }
            };
            let Some(view) = ipv4_payload(frame).and_then(Ipv4View::parse) else {
                continue;
            };
            let Some(protocol) = IpProtocol::from_number(view.protocol) else {
                continue;
            };
            let inbound = Inbound {
                source: IpAddr::V4(view.source),
                protocol,
                payload: view.payload,
            };
            if let Some(result) = matcher(&inbound) {
                return WaitOutcome::Resolved(result);
            }
            trace!(source = %view.source, "uncorrelated frame discarded");
        }
        WaitOutcome::Unknown
    }
}
