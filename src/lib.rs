//! # rawprobe - Raw-Packet Port Scanner
//!
//! rawprobe decides whether TCP and UDP ports are open, closed or filtered
//! by hand-building IPv4/IPv6 probes and interpreting whatever comes back.
//!
//! ## Features
//!
//! - **TCP SYN scanning**: half-open probes with one retransmission
//! - **UDP scanning**: ICMP/ICMPv6 port-unreachable detection
//! - **IPv4 and IPv6**: kernel raw sockets for both families
//! - **Link-layer delivery**: Ethernet injection with ARP resolution (IPv4)
//! - **Multiple Output Formats**: Plain text, JSON, and CSV
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use rawprobe::net::{AddressContext, CancelToken, SystemTransportFactory};
//! use rawprobe::packet::ProbeRng;
//! use rawprobe::scanner::{run_scan, ScanConfig};
//! use rawprobe::types::Port;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> rawprobe::error::Result<()> {
//!     let cancel = CancelToken::new();
//!     let context = AddressContext::new(Duration::from_secs(2), cancel.clone());
//!     let factory = Arc::new(SystemTransportFactory::raw_sockets(cancel.clone()));
//!
//!     let mut config = ScanConfig::new(vec!["192.168.1.1".parse().unwrap()]);
//!     config.tcp_ports = vec![Port::new(22), Port::new(443)];
//!
//!     let reports = run_scan(&config, &context, factory, &ProbeRng::from_entropy(), &cancel, None).await?;
//!     for report in reports {
//!         println!("{} {}", report.target, report.result);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`packet`] - Checksums and hand-built IPv4/IPv6, TCP, UDP and ICMP bytes
//! - [`net`] - Interface/address selection, ARP, raw and link-layer transports
//! - [`scanner`] - TCP and UDP engines plus the concurrent run driver
//! - [`types`] - Ports, port specifications and targets
//! - [`config`] - Persistent settings
//! - [`cli`] - Command-line front end
//! - [`output`] - Plain, JSON and CSV rendering
//! - [`error`] - Error types

pub mod cli;
pub mod config;
pub mod error;
pub mod net;
pub mod output;
pub mod packet;
pub mod scanner;
pub mod types;

// Re-export commonly used types
pub use error::{CliError, ScanError};
pub use scanner::{PortReport, ScanResult, Scanner};
pub use types::{Port, PortSpec, Protocol, ScanTarget, TargetSpec};
