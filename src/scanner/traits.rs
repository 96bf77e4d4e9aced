//! Scanner trait abstraction.
//!
//! Both engines sit behind one interface so the driver can fan out over a
//! mixed TCP/UDP job list.

use crate::error::Result;
use crate::scanner::PortReport;
use crate::types::{Port, Protocol};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Trait for port scanner implementations.
///
/// # Example
///
/// ```ignore
/// use rawprobe::scanner::{PortReport, Scanner};
///
/// async fn scan<S: Scanner>(scanner: &S, port: Port) -> Result<PortReport> {
///     scanner.scan_port(port).await
/// }
/// ```
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Transport protocol this scanner probes.
    fn protocol(&self) -> Protocol;

    /// Scan a single port.
    ///
    /// Never yields an undecided state; silence has already been turned
    /// into the protocol's default result.
    async fn scan_port(&self, port: Port) -> Result<PortReport>;

    /// Get the target IP address.
    fn target(&self) -> IpAddr;

    /// Get the per-wait timeout.
    fn timeout(&self) -> Duration;
}
