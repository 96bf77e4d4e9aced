//! Error types for rawprobe.
//!
//! Uses `thiserror` for ergonomic error definitions.

use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::packet::PacketError;
use crate::types::{PortError, TargetError};

/// Main error type for scanning operations.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Interface {interface} has no {family} address")]
    NoAddressForFamily {
        interface: String,
        family: &'static str,
    },

    #[error("No ARP reply from {0}")]
    NoArpReply(IpAddr),

    #[error("Default gateway for {0} could not be resolved")]
    GatewayUnresolvable(String),

    #[error("Link-layer delivery is not supported for {0}")]
    UnsupportedFamily(IpAddr),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Raw socket error: {0}")]
    RawSocketError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid packet: {0}")]
    Packet(#[from] PacketError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Classify an error raised while opening a raw socket or capture handle.
    pub fn from_socket(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScanError::PermissionDenied(
                "Raw socket access requires root/sudo privileges".to_string(),
            ),
            _ => {
                let err_str = err.to_string().to_lowercase();
                if err_str.contains("permission") || err_str.contains("operation not permitted") {
                    ScanError::PermissionDenied(
                        "Raw socket access requires root/sudo privileges".to_string(),
                    )
                } else {
                    ScanError::RawSocketError(err.to_string())
                }
            }
        }
    }

    /// Whether this error invalidates the whole run rather than a single port.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScanError::InterfaceNotFound(_)
                | ScanError::NoAddressForFamily { .. }
                | ScanError::InvalidConfig(_)
                | ScanError::PermissionDenied(_)
                | ScanError::UnsupportedFamily(_)
        )
    }
}

/// Result type alias for scan operations.
pub type Result<T, E = ScanError> = std::result::Result<T, E>;

/// Errors raised while loading or saving settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine the configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("invalid settings format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level error for the command-line front end.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for CLI operations.
pub type CliResult<T> = std::result::Result<T, CliError>;
