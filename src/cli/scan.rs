//! Scan command implementation.
//!
//! Resolves the target, wires the address context and transport factory
//! together, and hands the reports to the output layer.

use crate::cli::Cli;
use crate::config::AppSettings;
use crate::error::{CliError, CliResult};
use crate::net::{AddressContext, CancelToken, SystemTransportFactory};
use crate::output::{self, OutputFormat};
use crate::packet::ProbeRng;
use crate::scanner::{run_scan, PortReport, ScanConfig};
use crate::types::{Port, PortSpec, TargetSpec};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{info, warn};

/// Run one scan of `target` with the merged settings and print the result.
pub async fn execute(cli: &Cli, settings: &AppSettings, target: &str) -> CliResult<()> {
    let tcp_ports = ports_of(cli.tcp_ports.as_ref());
    let udp_ports = ports_of(cli.udp_ports.as_ref());
    if tcp_ports.is_empty() && udp_ports.is_empty() {
        return Err(CliError::Other(
            "no ports requested; use -t/--pt and/or -u/--pu".to_string(),
        ));
    }

    let addresses = TargetSpec::parse(target)?.resolve().await?;
    info!(host = target, addresses = addresses.len(), "target resolved");

    if !is_root() {
        output::print_warning("raw sockets need root (or CAP_NET_RAW); the scan will likely fail.");
    }

    let cancel = CancelToken::new();
    watch_interrupt(cancel.clone());

    let rng = match cli.seed {
        Some(seed) => ProbeRng::seeded(seed),
        None => ProbeRng::from_entropy(),
    };
    let context = Arc::new(AddressContext::new(settings.arp_timeout(), cancel.clone()));

    let mut config = ScanConfig::new(addresses);
    config.tcp_ports = tcp_ports;
    config.udp_ports = udp_ports;
    config.timeout = settings.timeout();
    config.concurrency = settings.concurrency;
    config.interface = settings.interface.clone();
    config.udp_payload_len = settings.udp_payload_len;

    let progress = (settings.output_format == OutputFormat::Plain)
        .then(|| progress_bar(config.total_probes() as u64));

    let reports: Vec<PortReport> = if settings.link_layer {
        let factory = SystemTransportFactory::link_layer(cancel.clone(), Arc::clone(&context));
        run_scan(&config, &context, Arc::new(factory), &rng, &cancel, progress.as_ref()).await?
    } else {
        let factory = SystemTransportFactory::raw_sockets(cancel.clone());
        run_scan(&config, &context, Arc::new(factory), &rng, &cancel, progress.as_ref()).await?
    };

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    if cancel.is_cancelled() {
        output::print_warning("scan interrupted; unfinished ports carry their default state.");
    }

    output::print_results(&reports, settings.output_format)?;
    Ok(())
}

fn ports_of(spec: Option<&PortSpec>) -> Vec<Port> {
    spec.map(PortSpec::to_ports).unwrap_or_default()
}

/// Flip the token on the first Ctrl-C; in-flight waits end within one
/// read slice.
fn watch_interrupt(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            cancel.cancel();
        }
    });
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

/// Check if running with root privileges.
fn is_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
