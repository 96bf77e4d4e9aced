//! Core type definitions using newtype patterns for type safety.
//!
//! A port number outside 0-65535 cannot be represented, so no packet builder
//! ever sees one.

mod port;
mod target;

pub use port::{Port, PortError, PortRange, PortSpec};
pub use target::{Protocol, ScanTarget, TargetError, TargetSpec};
