use anyhow::{bail, Context, Result};
use clap::Parser;
use rawprobe::cli::{self, Cli};
use rawprobe::output;
use std::io;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.lists_interfaces() {
        let stdout = io::stdout();
        cli::print_interfaces(&mut stdout.lock(), &pnet::datalink::interfaces())?;
        return Ok(());
    }

    let settings = cli.settings().context("failed to load settings")?;
    let Some(target) = cli.target.as_deref() else {
        bail!("a TARGET is required (use -i alone to list interfaces)");
    };

    if let Err(e) = cli::scan::execute(&cli, &settings, target).await {
        output::print_error(&e.to_string());
        std::process::exit(1);
    }
    Ok(())
}

/// Logs go to stderr so stdout carries only results. `RUST_LOG` wins over
/// the default level.
fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
