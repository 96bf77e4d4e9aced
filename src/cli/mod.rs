//! Command-line interface definitions.
//!
//! A single flat command: `rawprobe [OPTIONS] <TARGET>`. Running `-i`
//! without a value lists the active interfaces instead of scanning.

pub mod scan;

use crate::config::AppSettings;
use crate::error::ConfigResult;
use crate::output::OutputFormat;
use crate::types::PortSpec;
use clap::Parser;
use pnet::datalink::NetworkInterface;
use std::io::{self, Write};
use std::path::PathBuf;

/// rawprobe - TCP SYN and UDP port scanner built on raw packets.
#[derive(Parser, Debug)]
#[command(name = "rawprobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A raw-packet TCP SYN / UDP port scanner", long_about = None)]
pub struct Cli {
    /// Target IP address or hostname; every resolved address is scanned
    #[arg(value_name = "TARGET")]
    pub target: Option<String>,

    /// TCP ports to scan (e.g., "22", "22,80", "1-1024")
    #[arg(short = 't', long = "pt", value_name = "PORTS")]
    pub tcp_ports: Option<PortSpec>,

    /// UDP ports to scan
    #[arg(short = 'u', long = "pu", value_name = "PORTS")]
    pub udp_ports: Option<PortSpec>,

    /// Reply timeout in milliseconds
    #[arg(short = 'w', long = "wait", value_name = "MS")]
    pub wait: Option<u64>,

    /// Interface name or MAC address; with no value, list active interfaces
    #[arg(short = 'i', long, value_name = "IFACE", num_args = 0..=1)]
    pub interface: Option<Option<String>>,

    /// Deliver IPv4 probes as Ethernet frames (resolves MACs via ARP)
    #[arg(long)]
    pub link_layer: bool,

    /// Output format for results
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Maximum number of probes in flight
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Zero bytes appended to each UDP probe
    #[arg(long, value_name = "BYTES")]
    pub udp_payload: Option<usize>,

    /// Seed for source ports and sequence numbers (reproducible probes)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to a settings file instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// `-i` given without a value.
    pub fn lists_interfaces(&self) -> bool {
        matches!(self.interface, Some(None))
    }

    /// Load the settings file and lay the command-line flags over it.
    pub fn settings(&self) -> ConfigResult<AppSettings> {
        let base = match &self.config {
            Some(path) => AppSettings::load_from(path)?,
            None => AppSettings::load()?,
        };
        let settings = self.apply_overrides(base);
        settings.validate()?;
        Ok(settings)
    }

    /// Flags win over file values; absent flags leave them untouched.
    pub fn apply_overrides(&self, mut settings: AppSettings) -> AppSettings {
        if let Some(wait) = self.wait {
            settings.timeout_ms = wait;
        }
        if let Some(Some(iface)) = &self.interface {
            settings.interface = Some(iface.clone());
        }
        if self.link_layer {
            settings.link_layer = true;
        }
        if let Some(format) = self.output {
            settings.output_format = format;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
        if let Some(len) = self.udp_payload {
            settings.udp_payload_len = len;
        }
        settings
    }
}

/// Print the interfaces that are up and carry at least one address.
pub fn print_interfaces<W: Write>(out: &mut W, interfaces: &[NetworkInterface]) -> io::Result<()> {
    writeln!(out, "Active interfaces:")?;
    for iface in interfaces.iter().filter(|i| i.is_up() && !i.ips.is_empty()) {
        let mac = iface
            .mac
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string());
        let ips: Vec<String> = iface.ips.iter().map(|n| n.ip().to_string()).collect();
        writeln!(out, "  - {} ({}) {}", iface.name, mac, ips.join(", "))?;
    }
    Ok(())
}
