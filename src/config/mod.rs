//! Configuration management for rawprobe.
//!
//! Provides XDG-compliant settings storage; command-line flags override
//! whatever the file says.

mod settings;

pub use settings::{AppSettings, Paths};
