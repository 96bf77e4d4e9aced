//! Output formatting module.
//!
//! Renders port reports as plain text, JSON, or CSV. Everything here writes
//! to stdout; logs go to stderr.

use crate::scanner::{PortReport, ScanResult};
use clap::ValueEnum;
use console::{style, Style};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable plain text
    Plain,
    /// JSON structured output
    Json,
    /// CSV format for data analysis
    Csv,
}

/// Format and print reports according to the specified format.
pub fn print_results(reports: &[PortReport], format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_results(&mut out, reports, format)
}

/// Same as [`print_results`], into any writer.
pub fn write_results<W: Write>(
    out: &mut W,
    reports: &[PortReport],
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Plain => write_plain(out, reports),
        OutputFormat::Json => write_json(out, reports),
        OutputFormat::Csv => write_csv(out, reports),
    }
}

fn write_plain<W: Write>(out: &mut W, reports: &[PortReport]) -> io::Result<()> {
    if reports.is_empty() {
        writeln!(out, "{}", style("No ports scanned.").dim())?;
        return Ok(());
    }

    for report in reports {
        let state_style = match report.result {
            ScanResult::Open => Style::new().green().bold(),
            ScanResult::Closed => Style::new().red(),
            ScanResult::Filtered => Style::new().yellow(),
        };
        writeln!(
            out,
            "{:<28} {}",
            report.target.to_string(),
            state_style.apply_to(report.result)
        )?;
    }

    let open = reports.iter().filter(|r| r.is_open()).count();
    writeln!(
        out,
        "{} {} ports, {} open",
        style("Done:").bold(),
        reports.len(),
        style(open).green().bold()
    )?;
    Ok(())
}

fn write_json<W: Write>(out: &mut W, reports: &[PortReport]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, reports)?;
    writeln!(out)
}

fn write_csv<W: Write>(out: &mut W, reports: &[PortReport]) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(["address", "port", "protocol", "result", "response_time_ms"])?;
    for report in reports {
        wtr.write_record([
            report.target.address.to_string(),
            report.target.port.to_string(),
            report.target.protocol.to_string(),
            report.result.to_string(),
            report
                .response_time_ms
                .map_or(String::new(), |t| t.to_string()),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Port, Protocol, ScanTarget};
    use std::time::Duration;

    fn reports() -> Vec<PortReport> {
        vec![
            PortReport::new(
                ScanTarget::new("10.0.0.1".parse().unwrap(), Port::new(22), Protocol::Tcp),
                ScanResult::Open,
            )
            .with_response_time(Duration::from_millis(12)),
            PortReport::new(
                ScanTarget::new("::1".parse().unwrap(), Port::new(53), Protocol::Udp),
                ScanResult::Closed,
            ),
        ]
    }

    fn render(format: OutputFormat) -> String {
        console::set_colors_enabled(false);
        let mut buf = Vec::new();
        write_results(&mut buf, &reports(), format).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_plain_output() {
        let text = render(OutputFormat::Plain);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("10.0.0.1:22/tcp"));
        assert!(lines[0].ends_with("open"));
        assert!(lines[1].starts_with("[::1]:53/udp"));
        assert!(lines[1].ends_with("closed"));
        assert!(lines[2].contains("2 ports, 1 open"));
    }

    #[test]
    fn test_json_output() {
        let value: serde_json::Value = serde_json::from_str(&render(OutputFormat::Json)).unwrap();
        assert_eq!(value[0]["target"]["port"], 22);
        assert_eq!(value[0]["result"], "open");
        assert_eq!(value[0]["response_time_ms"], 12);
        assert_eq!(value[1]["target"]["protocol"], "udp");
    }

    #[test]
    fn test_csv_output() {
        let text = render(OutputFormat::Csv);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "address,port,protocol,result,response_time_ms");
        assert_eq!(lines[1], "10.0.0.1,22,tcp,open,12");
        assert_eq!(lines[2], "::1,53,udp,closed,");
    }

    #[test]
    fn test_format_serialization() {
        assert_eq!(serde_json::to_string(&OutputFormat::Csv).unwrap(), "\"csv\"");
    }
}
