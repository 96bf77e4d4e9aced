//! Local addressing and packet transports.
//!
//! [`AddressContext`] answers "which source address and interface do we use
//! for this target" and "which MAC does this next hop have". The transports
//! move probe bytes out and hand correlated replies back to the engines.

pub mod address;
pub mod cancel;
pub mod datalink;
pub mod transport;

pub use address::{AddressContext, NetworkEndpointContext};
pub use cancel::CancelToken;
pub use transport::{
    Inbound, ProbeKind, RawTransport, SystemTransportFactory, TransportFactory, WaitOutcome,
};

use std::fmt;
use std::net::IpAddr;

/// Longest single blocking read; waits re-check cancellation at this period.
pub const READ_SLICE: std::time::Duration = std::time::Duration::from_millis(100);

/// IP address family of a target or local address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(address: IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AddressFamily::V4 => "IPv4",
            AddressFamily::V6 => "IPv6",
        }
    }

    pub fn matches(self, address: IpAddr) -> bool {
        Self::of(address) == self
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
