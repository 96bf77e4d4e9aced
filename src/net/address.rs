//! Local source addresses and next-hop hardware addresses.
//!
//! Interface data comes from `pnet::datalink::interfaces()`. Hardware
//! addresses are looked up in a per-run cache, then the kernel neighbor
//! table, then by ARP on the wire; off-link targets go through the default
//! gateway. Kernel tables and capture handles are reached through a
//! [`LinkEnvironment`], so resolution runs against canned tables in tests.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::mpsc::{sync_channel, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use pnet::datalink::{self, Channel, Config, NetworkInterface};
use pnet::util::MacAddr;
use tracing::{debug, trace};

use super::datalink::open_ethernet_channel;
use super::{AddressFamily, CancelToken, READ_SLICE};
use crate::error::{Result, ScanError};
use crate::packet::ethernet::{arp_reply_from, arp_request};

const NEIGHBOR_TABLE: &str = "/proc/net/arp";
const ROUTE_TABLE: &str = "/proc/net/route";

/// Default bound on a single ARP exchange.
pub const DEFAULT_ARP_TIMEOUT: Duration = Duration::from_millis(2000);

/// Everything a probe needs to know about our side of the conversation.
///
/// Derived once per address family for a run and shared read-only.
#[derive(Debug, Clone)]
pub struct NetworkEndpointContext {
    pub local_address: IpAddr,
    pub local_hardware_address: Option<MacAddr>,
    pub interface: NetworkInterface,
}

/// Where neighbor and route tables come from, and how capture handles are
/// opened.
pub trait LinkEnvironment: fmt::Debug + Send + Sync {
    /// Neighbor table in `/proc/net/arp` layout; `None` when unreadable.
    fn neighbor_table(&self) -> Option<String>;

    /// Route table in `/proc/net/route` layout; `None` when unreadable.
    fn route_table(&self) -> Option<String>;

    fn open_channel(&self, iface: &NetworkInterface, config: Config) -> io::Result<Channel>;
}

/// The running kernel: procfs tables and `pnet::datalink::channel`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLink;

impl LinkEnvironment for SystemLink {
    fn neighbor_table(&self) -> Option<String> {
        fs::read_to_string(NEIGHBOR_TABLE).ok()
    }

    fn route_table(&self) -> Option<String> {
        fs::read_to_string(ROUTE_TABLE).ok()
    }

    fn open_channel(&self, iface: &NetworkInterface, config: Config) -> io::Result<Channel> {
        datalink::channel(iface, config)
    }
}

/// Interface inventory plus the per-run hardware address cache.
#[derive(Debug)]
pub struct AddressContext {
    interfaces: Vec<NetworkInterface>,
    link_cache: Mutex<HashMap<(String, Ipv4Addr), MacAddr>>,
    link: Box<dyn LinkEnvironment>,
    arp_timeout: Duration,
    cancel: CancelToken,
}

impl AddressContext {
    /// Build a context from the system's interfaces.
    pub fn new(arp_timeout: Duration, cancel: CancelToken) -> Self {
        Self::with_interfaces(datalink::interfaces(), arp_timeout, cancel)
    }

    pub fn with_interfaces(
        interfaces: Vec<NetworkInterface>,
        arp_timeout: Duration,
        cancel: CancelToken,
    ) -> Self {
        Self {
            interfaces,
            link_cache: Mutex::new(HashMap::new()),
            link: Box::new(SystemLink),
            arp_timeout,
            cancel,
        }
    }

    /// Replace the kernel tables and capture handles consulted.
    pub fn with_link_environment(mut self, link: impl LinkEnvironment + 'static) -> Self {
        self.link = Box::new(link);
        self
    }

    pub fn interfaces(&self) -> &[NetworkInterface] {
        &self.interfaces
    }

    /// Find an interface by name or by MAC address, ignoring case.
    pub fn find_interface(&self, selector: &str) -> Result<&NetworkInterface> {
        let mac = selector.parse::<MacAddr>().ok();
        self.interfaces
            .iter()
            .find(|iface| {
                iface.name.eq_ignore_ascii_case(selector)
                    || (mac.is_some() && iface.mac == mac)
            })
            .ok_or_else(|| ScanError::InterfaceNotFound(selector.to_string()))
    }

    /// The address we send from on `selector` for the given family.
    pub fn local_address(&self, selector: &str, family: AddressFamily) -> Result<IpAddr> {
        let iface = self.find_interface(selector)?;
        preferred_address(iface, family).ok_or_else(|| ScanError::NoAddressForFamily {
            interface: iface.name.clone(),
            family: family.name(),
        })
    }

    /// Resolve the endpoint used to reach `target`.
    ///
    /// With no selector, the first up, non-loopback interface carrying an
    /// address of the target's family is chosen; loopback targets use the
    /// loopback interface.
    pub fn endpoint(
        &self,
        selector: Option<&str>,
        target: IpAddr,
    ) -> Result<NetworkEndpointContext> {
        let family = AddressFamily::of(target);
        let (iface, local_address) = match selector {
            Some(selector) => (
                self.find_interface(selector)?,
                self.local_address(selector, family)?,
            ),
            None => {
                let wants_loopback = target.is_loopback();
                self.interfaces
                    .iter()
                    .filter(|iface| iface.is_up() && iface.is_loopback() == wants_loopback)
                    .find_map(|iface| preferred_address(iface, family).map(|ip| (iface, ip)))
                    .ok_or_else(|| {
                        ScanError::InterfaceNotFound(format!(
                            "no active interface with an {} address",
                            family
                        ))
                    })?
            }
        };

        debug!(
            interface = %iface.name,
            %local_address,
            "selected {} endpoint", family
        );

        Ok(NetworkEndpointContext {
            local_address,
            local_hardware_address: iface.mac,
            interface: iface.clone(),
        })
    }

    /// Hardware address of the next hop towards `target` on `iface`.
    pub fn resolve_hardware_address(
        &self,
        target: IpAddr,
        iface: &NetworkInterface,
    ) -> Result<MacAddr> {
        match target {
            IpAddr::V4(v4) => self.resolve_v4(v4, iface, true),
            IpAddr::V6(_) => Err(ScanError::UnsupportedFamily(target)),
        }
    }

    fn resolve_v4(
        &self,
        target: Ipv4Addr,
        iface: &NetworkInterface,
        follow_gateway: bool,
    ) -> Result<MacAddr> {
        if iface.is_loopback() {
            return Ok(MacAddr::zero());
        }

        let key = (iface.name.clone(), target);
        if let Some(mac) = self.cache().get(&key) {
            trace!(%target, %mac, "hardware address from cache");
            return Ok(*mac);
        }

        if let Some(mac) = self
            .link
            .neighbor_table()
            .and_then(|table| parse_neighbor_table(&table, target, &iface.name))
        {
            debug!(%target, %mac, "hardware address from neighbor table");
            self.cache().insert(key, mac);
            return Ok(mac);
        }

        if is_on_link(iface, target) {
            let source = match preferred_address(iface, AddressFamily::V4) {
                Some(IpAddr::V4(source)) => source,
                _ => {
                    return Err(ScanError::NoAddressForFamily {
                        interface: iface.name.clone(),
                        family: AddressFamily::V4.name(),
                    })
                }
            };
            let source_mac = iface.mac.ok_or_else(|| {
                ScanError::InvalidConfig(format!("interface {} has no MAC address", iface.name))
            })?;
            let mac = arp_exchange(
                iface,
                source_mac,
                source,
                target,
                self.arp_timeout,
                &self.cancel,
                |iface, config| self.link.open_channel(iface, config),
            )?;
            self.cache().insert(key, mac);
            return Ok(mac);
        }

        if !follow_gateway {
            return Err(ScanError::NoArpReply(IpAddr::V4(target)));
        }

        let gateway = self
            .link
            .route_table()
            .and_then(|table| parse_route_table(&table, &iface.name))
            .ok_or_else(|| ScanError::GatewayUnresolvable(iface.name.clone()))?;
        debug!(%target, %gateway, "target is off-link, resolving gateway");
        let mac = self.resolve_v4(gateway, iface, false)?;
        self.cache().insert(key, mac);
        Ok(mac)
    }

    /// Open a capture handle through the configured environment.
    pub(crate) fn open_channel(
        &self,
        iface: &NetworkInterface,
        config: Config,
    ) -> io::Result<Channel> {
        self.link.open_channel(iface, config)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<(String, Ipv4Addr), MacAddr>> {
        self.link_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// First unicast address of `family` on `iface`; for IPv6 a non-link-local
/// address wins when one exists.
fn preferred_address(iface: &NetworkInterface, family: AddressFamily) -> Option<IpAddr> {
    let mut candidates = iface
        .ips
        .iter()
        .map(|net| net.ip())
        .filter(|ip| family.matches(*ip) && !ip.is_multicast() && !ip.is_unspecified());
    match family {
        AddressFamily::V4 => candidates.next(),
        AddressFamily::V6 => {
            let all: Vec<IpAddr> = candidates.collect();
            all.iter()
                .copied()
                .find(|ip| !is_link_local_v6(ip))
                .or_else(|| all.first().copied())
        }
    }
}

fn is_link_local_v6(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V6(v6) => is_unicast_link_local(v6),
        IpAddr::V4(_) => false,
    }
}

pub(crate) fn is_unicast_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

fn is_on_link(iface: &NetworkInterface, target: Ipv4Addr) -> bool {
    iface
        .ips
        .iter()
        .any(|net| net.is_ipv4() && net.contains(IpAddr::V4(target)))
}

/// Broadcast one ARP request for `target` and wait for its reply.
///
/// The capture handle is open before the request leaves, so a fast reply
/// cannot slip past. The capture thread hands the answer back through a
/// one-slot channel and exits.
pub(crate) fn arp_exchange<F>(
    iface: &NetworkInterface,
    source_mac: MacAddr,
    source: Ipv4Addr,
    target: Ipv4Addr,
    timeout: Duration,
    cancel: &CancelToken,
    opener: F,
) -> Result<MacAddr>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let config = Config {
        read_timeout: Some(READ_SLICE),
        ..Default::default()
    };
    let (mut tx, mut rx) = open_ethernet_channel(iface, config, opener)?;

    let (reply_tx, reply_rx) = sync_channel::<MacAddr>(1);
    let deadline = Instant::now() + timeout;
    let capture_cancel = cancel.clone();
    thread::spawn(move || {
        while Instant::now() < deadline && !capture_cancel.is_cancelled() {
            match rx.next() {
                Ok(frame) => {
                    if let Some(mac) = arp_reply_from(frame, target) {
                        let _ = reply_tx.try_send(mac);
                        return;
                    }
                }
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
                Err(e) => {
                    debug!(error = %e, "capture failed, abandoning ARP wait");
                    return;
                }
            }
        }
    });

    let request = arp_request(source_mac, source, target)?;
    match tx.send_to(&request, None) {
        Some(Ok(())) => {}
        Some(Err(e)) => return Err(ScanError::from_socket(e)),
        None => {
            return Err(ScanError::RawSocketError(
                "capture handle refused the ARP request".to_string(),
            ))
        }
    }
    debug!(%target, interface = %iface.name, "ARP request sent");

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || cancel.is_cancelled() {
            return Err(ScanError::NoArpReply(IpAddr::V4(target)));
        }
        match reply_rx.recv_timeout(remaining.min(READ_SLICE)) {
            Ok(mac) => {
                debug!(%target, %mac, "ARP reply");
                return Ok(mac);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ScanError::NoArpReply(IpAddr::V4(target)))
            }
        }
    }
}

/// Look up `target` in `/proc/net/arp` content.
///
/// Incomplete entries (flags 0x0 or an all-zero MAC) are skipped.
pub fn parse_neighbor_table(table: &str, target: Ipv4Addr, interface: &str) -> Option<MacAddr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return None;
        }
        let ip: Ipv4Addr = fields[0].parse().ok()?;
        let flags = u32::from_str_radix(fields[2].trim_start_matches("0x"), 16).ok()?;
        let mac: MacAddr = fields[3].parse().ok()?;
        if ip != target || fields[5] != interface || flags == 0 || mac == MacAddr::zero() {
            return None;
        }
        Some(mac)
    })
}

/// Default gateway of `interface` from `/proc/net/route` content.
///
/// Addresses in that file are hex in host (little-endian) byte order.
pub fn parse_route_table(table: &str, interface: &str) -> Option<Ipv4Addr> {
    const RTF_GATEWAY: u32 = 0x2;
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != interface || fields[1] != "00000000" {
            return None;
        }
        let gateway = u32::from_str_radix(fields[2], 16).ok()?;
        let flags = u32::from_str_radix(fields[3], 16).ok()?;
        if flags & RTF_GATEWAY == 0 || gateway == 0 {
            return None;
        }
        Some(Ipv4Addr::from(gateway.to_le_bytes()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ethernet::{ARP_LEN, ETH_HEADER_LEN, MIN_FRAME_LEN};
    use ipnetwork::IpNetwork;
    use pnet::datalink::dummy;
    use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, MutableArpPacket};
    use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};

    const ETH0_MAC: MacAddr = MacAddr(0x02, 0x42, 0xac, 0x11, 0x00, 0x02);

    fn iface(name: &str, flags: u32, mac: Option<MacAddr>, ips: &[&str]) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            description: String::new(),
            index: 0,
            mac,
            ips: ips.iter().map(|s| s.parse::<IpNetwork>().unwrap()).collect(),
            flags,
        }
    }

    fn context() -> AddressContext {
        let up = (libc::IFF_UP | libc::IFF_RUNNING) as u32;
        let lo = up | libc::IFF_LOOPBACK as u32;
        AddressContext::with_interfaces(
            vec![
                iface("lo", lo, None, &["127.0.0.1/8", "::1/128"]),
                iface("docker0", 0, Some(MacAddr(2, 0, 0, 0, 0, 9)), &["172.17.0.1/16"]),
                iface(
                    "eth0",
                    up,
                    Some(ETH0_MAC),
                    &["fe80::42:acff:fe11:2/64", "172.18.0.2/16", "2001:db8::2/64"],
                ),
            ],
            DEFAULT_ARP_TIMEOUT,
            CancelToken::new(),
        )
    }

    #[test]
    fn test_local_address_by_name_and_mac() {
        let ctx = context();
        assert_eq!(
            ctx.local_address("ETH0", AddressFamily::V4).unwrap(),
            "172.18.0.2".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            ctx.local_address("02:42:AC:11:00:02", AddressFamily::V4)
                .unwrap(),
            "172.18.0.2".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_local_address_prefers_global_ipv6() {
        let ctx = context();
        assert_eq!(
            ctx.local_address("eth0", AddressFamily::V6).unwrap(),
            "2001:db8::2".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_local_address_errors() {
        let ctx = context();
        assert!(matches!(
            ctx.local_address("wlan7", AddressFamily::V4),
            Err(ScanError::InterfaceNotFound(_))
        ));
        assert!(matches!(
            ctx.local_address("docker0", AddressFamily::V6),
            Err(ScanError::NoAddressForFamily { family: "IPv6", .. })
        ));
    }

    #[test]
    fn test_endpoint_selection() {
        let ctx = context();

        // docker0 is down, so eth0 is the first usable interface.
        let endpoint = ctx.endpoint(None, "93.184.216.34".parse().unwrap()).unwrap();
        assert_eq!(endpoint.interface.name, "eth0");
        assert_eq!(endpoint.local_hardware_address, Some(ETH0_MAC));

        let endpoint = ctx.endpoint(None, "127.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(endpoint.interface.name, "lo");
        assert_eq!(endpoint.local_address, "127.0.0.1".parse::<IpAddr>().unwrap());

        let endpoint = ctx.endpoint(None, "::1".parse().unwrap()).unwrap();
        assert_eq!(endpoint.local_address, "::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_loopback_needs_no_hardware_address() {
        let ctx = context();
        let lo = ctx.find_interface("lo").unwrap().clone();
        assert_eq!(
            ctx.resolve_hardware_address("127.0.0.1".parse().unwrap(), &lo)
                .unwrap(),
            MacAddr::zero()
        );
        assert!(matches!(
            ctx.resolve_hardware_address("::1".parse().unwrap(), &lo),
            Err(ScanError::UnsupportedFamily(_))
        ));
    }

    #[test]
    fn test_on_link() {
        let ctx = context();
        let eth0 = ctx.find_interface("eth0").unwrap();
        assert!(is_on_link(eth0, Ipv4Addr::new(172, 18, 5, 5)));
        assert!(!is_on_link(eth0, Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn test_parse_neighbor_table() {
        let table = "\
IP address       HW type     Flags       HW address            Mask     Device
172.18.0.1       0x1         0x2         02:42:c6:9a:1b:01     *        eth0
172.18.0.9       0x1         0x0         00:00:00:00:00:00     *        eth0
10.0.0.1         0x1         0x2         aa:bb:cc:dd:ee:ff     *        wlan0
";
        assert_eq!(
            parse_neighbor_table(table, Ipv4Addr::new(172, 18, 0, 1), "eth0"),
            Some(MacAddr(0x02, 0x42, 0xc6, 0x9a, 0x1b, 0x01))
        );
        assert_eq!(
            parse_neighbor_table(table, Ipv4Addr::new(172, 18, 0, 9), "eth0"),
            None
        );
        assert_eq!(
            parse_neighbor_table(table, Ipv4Addr::new(10, 0, 0, 1), "eth0"),
            None
        );
    }

    #[test]
    fn test_parse_route_table() {
        let table = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t00000000\t010012AC\t0003\t0\t0\t0\t00000000\t0\t0\t0
eth0\t000012AC\t00000000\t0001\t0\t0\t0\t0000FFFF\t0\t0\t0
";
        assert_eq!(
            parse_route_table(table, "eth0"),
            Some(Ipv4Addr::new(172, 18, 0, 1))
        );
        assert_eq!(parse_route_table(table, "wlan0"), None);
    }

    fn arp_reply(sender: Ipv4Addr, sender_mac: MacAddr) -> Box<[u8]> {
        let mut frame = vec![0u8; MIN_FRAME_LEN];
        {
            let mut eth = MutableEthernetPacket::new(&mut frame).unwrap();
            eth.set_destination(ETH0_MAC);
            eth.set_source(sender_mac);
            eth.set_ethertype(EtherTypes::Arp);
        }
        let mut arp =
            MutableArpPacket::new(&mut frame[ETH_HEADER_LEN..ETH_HEADER_LEN + ARP_LEN]).unwrap();
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Reply);
        arp.set_sender_hw_addr(sender_mac);
        arp.set_sender_proto_addr(sender);
        arp.set_target_hw_addr(ETH0_MAC);
        arp.set_target_proto_addr(Ipv4Addr::new(172, 18, 0, 2));
        frame.into_boxed_slice()
    }

    #[test]
    fn test_arp_exchange_takes_matching_reply() {
        let target = Ipv4Addr::new(172, 18, 0, 1);
        let peer = MacAddr(0x02, 0x42, 0xc6, 0x9a, 0x1b, 0x01);
        let eth0 = context().find_interface("eth0").unwrap().clone();

        let mut dummy_cfg = dummy::Config::default();
        let inject = dummy_cfg.inject_handle().unwrap();
        let sent = dummy_cfg.read_handle().unwrap();
        // A reply for another host first, then ours.
        inject
            .send(Ok(arp_reply(Ipv4Addr::new(172, 18, 0, 7), MacAddr(2, 2, 2, 2, 2, 2))))
            .unwrap();
        inject.send(Ok(arp_reply(target, peer))).unwrap();

        let opener = move |i: &NetworkInterface, _cfg: Config| dummy::channel(i, dummy_cfg);
        let mac = arp_exchange(
            &eth0,
            ETH0_MAC,
            Ipv4Addr::new(172, 18, 0, 2),
            target,
            Duration::from_secs(2),
            &CancelToken::new(),
            opener,
        )
        .unwrap();
        assert_eq!(mac, peer);

        let request = sent.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(arp_reply_from(&request, target), None);
        assert_eq!(request.len(), MIN_FRAME_LEN);
    }

    #[test]
    fn test_arp_exchange_open_failure() {
        let eth0 = context().find_interface("eth0").unwrap().clone();
        let opener = |_: &NetworkInterface, _: Config| -> std::io::Result<Channel> {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
        };
        let result = arp_exchange(
            &eth0,
            ETH0_MAC,
            Ipv4Addr::new(172, 18, 0, 2),
            Ipv4Addr::new(172, 18, 0, 1),
            Duration::from_millis(50),
            &CancelToken::new(),
            opener,
        );
        assert!(matches!(result, Err(ScanError::PermissionDenied(_))));
    }

    const GATEWAY_MAC: MacAddr = MacAddr(0x02, 0x42, 0xc6, 0x9a, 0x1b, 0x01);

    const ROUTES: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t00000000\t010012AC\t0003\t0\t0\t0\t00000000\t0\t0\t0
";

    /// Canned kernel tables; each opened channel takes the next queued
    /// dummy config, and opening fails once they run out.
    #[derive(Debug, Default)]
    struct CannedLink {
        neighbors: Option<String>,
        routes: Option<String>,
        channels: Mutex<Vec<dummy::Config>>,
    }

    impl LinkEnvironment for CannedLink {
        fn neighbor_table(&self) -> Option<String> {
            self.neighbors.clone()
        }

        fn route_table(&self) -> Option<String> {
            self.routes.clone()
        }

        fn open_channel(&self, iface: &NetworkInterface, _: Config) -> io::Result<Channel> {
            let config = self
                .channels
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no channel queued"))?;
            dummy::channel(iface, config)
        }
    }

    fn context_with(link: CannedLink, arp_timeout: Duration) -> (AddressContext, NetworkInterface) {
        let ctx = AddressContext::with_interfaces(
            context().interfaces().to_vec(),
            arp_timeout,
            CancelToken::new(),
        )
        .with_link_environment(link);
        let eth0 = ctx.find_interface("eth0").unwrap().clone();
        (ctx, eth0)
    }

    #[test]
    fn test_endpoint_with_selector_matches_local_address() {
        let ctx = context();
        let endpoint = ctx.endpoint(Some("eth0"), "2001:db8::99".parse().unwrap()).unwrap();
        assert_eq!(
            endpoint.local_address,
            ctx.local_address("eth0", AddressFamily::V6).unwrap()
        );
        assert_eq!(endpoint.interface.name, "eth0");

        assert!(matches!(
            ctx.endpoint(Some("docker0"), "2001:db8::99".parse().unwrap()),
            Err(ScanError::NoAddressForFamily { family: "IPv6", .. })
        ));
        assert!(matches!(
            ctx.endpoint(Some("wlan7"), "10.0.0.1".parse().unwrap()),
            Err(ScanError::InterfaceNotFound(_))
        ));
    }

    #[test]
    fn test_off_link_target_uses_gateway_neighbor_entry() {
        let neighbors = format!(
            "IP address       HW type     Flags       HW address            Mask     Device\n\
             172.18.0.1       0x1         0x2         {}     *        eth0\n",
            GATEWAY_MAC
        );
        let link = CannedLink {
            neighbors: Some(neighbors),
            routes: Some(ROUTES.to_string()),
            ..CannedLink::default()
        };
        let (ctx, eth0) = context_with(link, DEFAULT_ARP_TIMEOUT);

        let mac = ctx
            .resolve_hardware_address("8.8.8.8".parse().unwrap(), &eth0)
            .unwrap();
        assert_eq!(mac, GATEWAY_MAC);
        // Cached for the target as well as the gateway.
        assert!(ctx
            .cache()
            .contains_key(&("eth0".to_string(), Ipv4Addr::new(8, 8, 8, 8))));
        assert!(ctx
            .cache()
            .contains_key(&("eth0".to_string(), Ipv4Addr::new(172, 18, 0, 1))));
    }

    #[test]
    fn test_off_link_target_without_default_route() {
        let link = CannedLink {
            routes: Some(ROUTES.replace("eth0", "wlan0")),
            ..CannedLink::default()
        };
        let (ctx, eth0) = context_with(link, DEFAULT_ARP_TIMEOUT);
        assert!(matches!(
            ctx.resolve_hardware_address("8.8.8.8".parse().unwrap(), &eth0),
            Err(ScanError::GatewayUnresolvable(name)) if name == "eth0"
        ));
    }

    #[test]
    fn test_silent_gateway_gives_no_arp_reply() {
        let mut quiet = dummy::Config::default();
        let _inject = quiet.inject_handle().unwrap();
        let sent = quiet.read_handle().unwrap();
        let link = CannedLink {
            routes: Some(ROUTES.to_string()),
            channels: Mutex::new(vec![quiet]),
            ..CannedLink::default()
        };
        let (ctx, eth0) = context_with(link, Duration::from_millis(150));

        let result = ctx.resolve_hardware_address("8.8.8.8".parse().unwrap(), &eth0);
        assert!(matches!(
            result,
            Err(ScanError::NoArpReply(ip)) if ip == IpAddr::V4(Ipv4Addr::new(172, 18, 0, 1))
        ));
        // The request went out for the gateway, not the target.
        let request = sent.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(&request[38..42], &[172, 18, 0, 1]);
    }

    #[test]
    fn test_off_link_gateway_is_not_followed_twice() {
        // A gateway outside eth0's subnet would need another hop.
        let link = CannedLink {
            routes: Some(ROUTES.replace("010012AC", "0909090A")),
            ..CannedLink::default()
        };
        let (ctx, eth0) = context_with(link, DEFAULT_ARP_TIMEOUT);
        assert!(matches!(
            ctx.resolve_hardware_address("8.8.8.8".parse().unwrap(), &eth0),
            Err(ScanError::NoArpReply(ip)) if ip == IpAddr::V4(Ipv4Addr::new(10, 9, 9, 9))
        ));
    }

    #[test]
    fn test_arp_exchange_times_out_on_silent_link() {
        let eth0 = context().find_interface("eth0").unwrap().clone();
        let mut quiet = dummy::Config::default();
        let _inject = quiet.inject_handle().unwrap();
        let opener = move |i: &NetworkInterface, _: Config| dummy::channel(i, quiet);

        let timeout = Duration::from_millis(200);
        let start = Instant::now();
        let result = arp_exchange(
            &eth0,
            ETH0_MAC,
            Ipv4Addr::new(172, 18, 0, 2),
            Ipv4Addr::new(172, 18, 0, 1),
            timeout,
            &CancelToken::new(),
            opener,
        );
        let elapsed = start.elapsed();
        assert!(matches!(result, Err(ScanError::NoArpReply(_))));
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
    }

    #[test]
    fn test_arp_exchange_stops_on_capture_error() {
        let eth0 = context().find_interface("eth0").unwrap().clone();
        let mut broken = dummy::Config::default();
        let inject = broken.inject_handle().unwrap();
        inject
            .send(Err(io::Error::new(io::ErrorKind::Other, "interface went down")))
            .unwrap();
        let opener = move |i: &NetworkInterface, _: Config| dummy::channel(i, broken);

        let start = Instant::now();
        let result = arp_exchange(
            &eth0,
            ETH0_MAC,
            Ipv4Addr::new(172, 18, 0, 2),
            Ipv4Addr::new(172, 18, 0, 1),
            Duration::from_secs(5),
            &CancelToken::new(),
            opener,
        );
        assert!(matches!(result, Err(ScanError::NoArpReply(_))));
        assert!(start.elapsed() < Duration::from_secs(2));
        drop(inject);
    }
}
