//! Scanner module - runs the TCP SYN and UDP engines over a port list.
//!
//! Each `(address, port, protocol)` is one independent blocking operation
//! on the tokio blocking pool. Concurrency is bounded by a semaphore, the
//! same way for both protocols.

pub mod tcp;
pub mod traits;
pub mod udp;

use crate::error::{Result, ScanError};
use crate::net::{
    AddressContext, AddressFamily, CancelToken, NetworkEndpointContext, TransportFactory,
};
use crate::packet::ProbeRng;
use crate::types::{Port, Protocol, ScanTarget};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub use tcp::TcpScanEngine;
pub use traits::Scanner;
pub use udp::UdpScanEngine;

/// Final state of a scanned port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanResult {
    /// SYN-ACK received (TCP), or no port-unreachable (UDP).
    Open,
    /// RST (TCP) or ICMP port-unreachable (UDP) received.
    Closed,
    /// No reply to the SYN or its single retry.
    Filtered,
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanResult::Open => write!(f, "open"),
            ScanResult::Closed => write!(f, "closed"),
            ScanResult::Filtered => write!(f, "filtered"),
        }
    }
}

/// Outcome for a single target, as handed to the output layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortReport {
    pub target: ScanTarget,
    pub result: ScanResult,
    /// Time from the first send to the correlated reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl PortReport {
    pub fn new(target: ScanTarget, result: ScanResult) -> Self {
        Self {
            target,
            result,
            response_time_ms: None,
        }
    }

    /// Set the response time.
    pub fn with_response_time(mut self, elapsed: Duration) -> Self {
        self.response_time_ms = Some(elapsed.as_millis() as u64);
        self
    }

    pub fn is_open(&self) -> bool {
        self.result == ScanResult::Open
    }
}

/// What the engines share for one run against one address family.
pub struct ProbeContext<F> {
    pub endpoint: Arc<NetworkEndpointContext>,
    pub factory: Arc<F>,
    pub rng: ProbeRng,
    pub cancel: CancelToken,
    pub timeout: Duration,
}

// Manual impl: `F` itself need not be `Clone`.
impl<F> Clone for ProbeContext<F> {
    fn clone(&self) -> Self {
        Self {
            endpoint: Arc::clone(&self.endpoint),
            factory: Arc::clone(&self.factory),
            rng: self.rng.clone(),
            cancel: self.cancel.clone(),
            timeout: self.timeout,
        }
    }
}

/// Configuration for a scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Every resolved address of the target.
    pub addresses: Vec<IpAddr>,
    pub tcp_ports: Vec<Port>,
    pub udp_ports: Vec<Port>,
    /// Per-wait reply timeout.
    pub timeout: Duration,
    pub concurrency: usize,
    pub interface: Option<String>,
    /// Zero bytes appended to each UDP probe.
    pub udp_payload_len: usize,
}

impl ScanConfig {
    pub fn new(addresses: Vec<IpAddr>) -> Self {
        Self {
            addresses,
            tcp_ports: Vec::new(),
            udp_ports: Vec::new(),
            timeout: Duration::from_millis(5000),
            concurrency: 500,
            interface: None,
            udp_payload_len: 0,
        }
    }

    pub fn total_probes(&self) -> usize {
        self.addresses.len() * (self.tcp_ports.len() + self.udp_ports.len())
    }
}

/// Execute a complete scan and return one report per target, sorted by
/// address, protocol and port.
///
/// Configuration problems (unknown interface, missing privileges) abort the
/// run. An address family with no usable local endpoint is skipped with a
/// warning and its ports reported as filtered, unless no family has one, in
/// which case the first such error is returned. Any other failure affects
/// only its own port, which is logged and reported as filtered.
pub async fn run_scan<F: TransportFactory>(
    config: &ScanConfig,
    context: &AddressContext,
    factory: Arc<F>,
    rng: &ProbeRng,
    cancel: &CancelToken,
    progress: Option<&ProgressBar>,
) -> Result<Vec<PortReport>> {
    if config.concurrency == 0 {
        return Err(ScanError::InvalidConfig(
            "concurrency must be at least 1".to_string(),
        ));
    }
    let start_time = Instant::now();

    // One endpoint per family, shared by every probe of that family; `None`
    // marks a family with no usable endpoint.
    let mut endpoints: HashMap<AddressFamily, Option<Arc<NetworkEndpointContext>>> =
        HashMap::new();
    let mut endpoint_error: Option<ScanError> = None;
    let mut skipped: Vec<PortReport> = Vec::new();
    let mut jobs: Vec<(Arc<dyn Scanner>, Port)> = Vec::with_capacity(config.total_probes());
    for &address in &config.addresses {
        let family = AddressFamily::of(address);
        let endpoint = endpoints
            .entry(family)
            .or_insert_with(|| match context.endpoint(config.interface.as_deref(), address) {
                Ok(endpoint) => Some(Arc::new(endpoint)),
                Err(e) => {
                    warn!(%family, error = %e, "no usable local endpoint, skipping family");
                    endpoint_error.get_or_insert(e);
                    None
                }
            })
            .clone();
        let Some(endpoint) = endpoint else {
            skipped.extend(unreachable_reports(config, address));
            continue;
        };
        let probe_context = ProbeContext {
            endpoint,
            factory: Arc::clone(&factory),
            rng: rng.clone(),
            cancel: cancel.clone(),
            timeout: config.timeout,
        };

        let tcp: Arc<dyn Scanner> = Arc::new(TcpScanEngine::new(address, probe_context.clone()));
        jobs.extend(config.tcp_ports.iter().map(|&port| (Arc::clone(&tcp), port)));

        let udp: Arc<dyn Scanner> = Arc::new(UdpScanEngine::new(
            address,
            probe_context,
            config.udp_payload_len,
        ));
        jobs.extend(config.udp_ports.iter().map(|&port| (Arc::clone(&udp), port)));
    }

    if endpoints.values().all(Option::is_none) {
        if let Some(e) = endpoint_error {
            return Err(e);
        }
    }
    if let Some(pb) = progress {
        pb.inc(skipped.len() as u64);
    }

    info!(
        addresses = config.addresses.len(),
        probes = jobs.len(),
        skipped = skipped.len(),
        timeout_ms = config.timeout.as_millis() as u64,
        "starting scan"
    );

    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let outcomes = scan_with_scanners(jobs, semaphore, config.concurrency, progress).await;

    let mut reports = skipped;
    reports.reserve(outcomes.len());
    for (target, outcome) in outcomes {
        match outcome {
            Ok(report) => reports.push(report),
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                warn!(%target, error = %e, "probe failed, reporting filtered");
                reports.push(PortReport::new(target, ScanResult::Filtered));
            }
        }
    }
    reports.sort_by_key(|r| (r.target.address, r.target.protocol, r.target.port));

    info!(
        reports = reports.len(),
        open = reports.iter().filter(|r| r.is_open()).count(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "scan finished"
    );
    Ok(reports)
}

/// Filtered reports for every port of an address that cannot be scanned.
fn unreachable_reports(config: &ScanConfig, address: IpAddr) -> Vec<PortReport> {
    let tcp = config.tcp_ports.iter().map(|&port| (port, Protocol::Tcp));
    let udp = config.udp_ports.iter().map(|&port| (port, Protocol::Udp));
    tcp.chain(udp)
        .map(|(port, protocol)| {
            PortReport::new(ScanTarget::new(address, port, protocol), ScanResult::Filtered)
        })
        .collect()
}

/// Generic scan executor with bounded concurrency.
async fn scan_with_scanners(
    jobs: Vec<(Arc<dyn Scanner>, Port)>,
    semaphore: Arc<Semaphore>,
    buffer: usize,
    progress: Option<&ProgressBar>,
) -> Vec<(ScanTarget, Result<PortReport>)> {
    stream::iter(jobs)
        .map(|(scanner, port)| {
            let sem = Arc::clone(&semaphore);
            let progress = progress.cloned();

            async move {
                // The semaphore is never closed, so acquisition only waits.
                let _permit = sem.acquire().await.ok();

                let target = ScanTarget::new(scanner.target(), port, scanner.protocol());
                let outcome = scanner.scan_port(port).await;

                if let Some(ref pb) = progress {
                    pb.inc(1);
                    if matches!(&outcome, Ok(report) if report.is_open()) {
                        pb.set_message(format!("open: {}", target));
                    }
                }

                (target, outcome)
            }
        })
        .buffer_unordered(buffer)
        .collect()
        .await
}


#[cfg(test)]
mod tests {
    use super::mock::{Reply, ScriptedFactory};
    use super::*;
    use crate::packet::tcp::build_tcp_syn_segment;
    use crate::packet::{IpProtocol, TcpFlags};
    use ipnetwork::IpNetwork;
    use pnet::datalink::NetworkInterface;

    fn loopback_context() -> AddressContext {
        let lo = NetworkInterface {
            name: "lo".to_string(),
            description: String::new(),
            index: 1,
            mac: None,
            ips: vec![
                "127.0.0.1/8".parse::<IpNetwork>().unwrap(),
                "::1/128".parse::<IpNetwork>().unwrap(),
            ],
            flags: (libc::IFF_UP | libc::IFF_LOOPBACK | libc::IFF_RUNNING) as u32,
        };
        AddressContext::with_interfaces(vec![lo], Duration::from_millis(10), CancelToken::new())
    }

    /// Port 22 open, everything else closed, over TCP; UDP is silent.
    fn responder() -> ScriptedFactory {
        ScriptedFactory::new(|probe| {
            if probe.bytes.len() < 24 {
                return Vec::new();
            }
            let is_tcp = match probe.destination {
                IpAddr::V4(_) => probe.bytes[9] == 6,
                IpAddr::V6(_) => probe.bytes.len() == 24,
            };
            if !is_tcp {
                return Vec::new();
            }
            let flags = if probe.dest_port == 22 {
                TcpFlags::SYN_ACK
            } else {
                TcpFlags::RST | TcpFlags::ACK
            };
            let mut segment = build_tcp_syn_segment(probe.dest_port, probe.source_port, 0);
            segment[13] = flags.bits();
            vec![Reply {
                source: probe.destination,
                protocol: IpProtocol::Tcp,
                payload: segment.to_vec(),
            }]
        })
    }

    #[test]
    fn test_scan_result_display() {
        assert_eq!(ScanResult::Open.to_string(), "open");
        assert_eq!(ScanResult::Closed.to_string(), "closed");
        assert_eq!(ScanResult::Filtered.to_string(), "filtered");
    }

    #[test]
    fn test_port_report_serialization() {
        let target = ScanTarget::new("10.0.0.1".parse().unwrap(), Port::new(22), Protocol::Tcp);
        let report = PortReport::new(target, ScanResult::Open)
            .with_response_time(Duration::from_millis(15));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["result"], "open");
        assert_eq!(json["target"]["protocol"], "tcp");
        assert_eq!(json["target"]["port"], 22);
        assert_eq!(json["response_time_ms"], 15);

        let silent = PortReport::new(target, ScanResult::Filtered);
        let json = serde_json::to_value(&silent).unwrap();
        assert!(json.get("response_time_ms").is_none());
    }

    #[tokio::test]
    async fn test_run_scan_reports_every_target() {
        let factory = Arc::new(responder());
        let mut config = ScanConfig::new(vec![
            "127.0.0.1".parse().unwrap(),
            "::1".parse().unwrap(),
        ]);
        config.tcp_ports = vec![Port::new(22), Port::new(80)];
        config.udp_ports = vec![Port::new(53)];
        config.timeout = Duration::from_millis(10);
        config.concurrency = 4;

        let reports = run_scan(
            &config,
            &loopback_context(),
            Arc::clone(&factory),
            &ProbeRng::seeded(11),
            &CancelToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 6);
        let summary: Vec<(String, ScanResult)> = reports
            .iter()
            .map(|r| (r.target.to_string(), r.result))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("127.0.0.1:22/tcp".to_string(), ScanResult::Open),
                ("127.0.0.1:80/tcp".to_string(), ScanResult::Closed),
                ("127.0.0.1:53/udp".to_string(), ScanResult::Open),
                ("[::1]:22/tcp".to_string(), ScanResult::Open),
                ("[::1]:80/tcp".to_string(), ScanResult::Closed),
                ("[::1]:53/udp".to_string(), ScanResult::Open),
            ]
        );
        // Every operation opened its own transport.
        assert_eq!(factory.opened(), 6);
    }

    #[tokio::test]
    async fn test_run_scan_unknown_interface_is_fatal() {
        let mut config = ScanConfig::new(vec!["127.0.0.1".parse().unwrap()]);
        config.tcp_ports = vec![Port::new(22)];
        config.interface = Some("eth9".to_string());

        let factory = Arc::new(ScriptedFactory::silent());
        let result = run_scan(
            &config,
            &loopback_context(),
            Arc::clone(&factory),
            &ProbeRng::seeded(1),
            &CancelToken::new(),
            None,
        )
        .await;
        assert!(matches!(result, Err(ScanError::InterfaceNotFound(_))));
        assert_eq!(factory.sends(), 0);
    }

    #[tokio::test]
    async fn test_run_scan_rejects_zero_concurrency() {
        let mut config = ScanConfig::new(vec!["127.0.0.1".parse().unwrap()]);
        config.concurrency = 0;
        let result = run_scan(
            &config,
            &loopback_context(),
            Arc::new(ScriptedFactory::silent()),
            &ProbeRng::seeded(1),
            &CancelToken::new(),
            None,
        )
        .await;
        assert!(matches!(result, Err(ScanError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_run_scan_missing_family_keeps_other_family() {
        let eth0 = NetworkInterface {
            name: "eth0".to_string(),
            description: String::new(),
            index: 2,
            mac: Some(pnet::util::MacAddr(2, 0, 0, 0, 0, 2)),
            ips: vec!["10.0.0.2/24".parse::<IpNetwork>().unwrap()],
            flags: (libc::IFF_UP | libc::IFF_RUNNING) as u32,
        };
        let context =
            AddressContext::with_interfaces(vec![eth0], Duration::from_millis(10), CancelToken::new());

        let mut config = ScanConfig::new(vec![
            "10.0.0.9".parse().unwrap(),
            "2001:db8::9".parse().unwrap(),
        ]);
        config.tcp_ports = vec![Port::new(22)];
        config.udp_ports = vec![Port::new(53)];
        config.timeout = Duration::from_millis(10);

        let factory = Arc::new(responder());
        let reports = run_scan(
            &config,
            &context,
            Arc::clone(&factory),
            &ProbeRng::seeded(5),
            &CancelToken::new(),
            None,
        )
        .await
        .unwrap();

        let summary: Vec<(String, ScanResult)> = reports
            .iter()
            .map(|r| (r.target.to_string(), r.result))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("10.0.0.9:22/tcp".to_string(), ScanResult::Open),
                ("10.0.0.9:53/udp".to_string(), ScanResult::Open),
                ("[2001:db8::9]:22/tcp".to_string(), ScanResult::Filtered),
                ("[2001:db8::9]:53/udp".to_string(), ScanResult::Filtered),
            ]
        );
        // Only the IPv4 address was ever sent to.
        assert!(factory.sends() > 0);
        assert!(factory.sent().iter().all(|p| p.destination.is_ipv4()));
    }

    #[tokio::test]
    async fn test_run_scan_no_family_usable_is_fatal() {
        let mut config = ScanConfig::new(vec!["2001:db8::9".parse().unwrap()]);
        config.tcp_ports = vec![Port::new(22)];
        let eth0 = NetworkInterface {
            name: "eth0".to_string(),
            description: String::new(),
            index: 2,
            mac: None,
            ips: vec!["10.0.0.2/24".parse::<IpNetwork>().unwrap()],
            flags: (libc::IFF_UP | libc::IFF_RUNNING) as u32,
        };
        let context =
            AddressContext::with_interfaces(vec![eth0], Duration::from_millis(10), CancelToken::new());

        let factory = Arc::new(ScriptedFactory::silent());
        let result = run_scan(
            &config,
            &context,
            Arc::clone(&factory),
            &ProbeRng::seeded(1),
            &CancelToken::new(),
            None,
        )
        .await;
        assert!(matches!(result, Err(ScanError::InterfaceNotFound(_))));
        assert_eq!(factory.sends(), 0);
    }
}
