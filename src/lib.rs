//! ferrosnmp - a multi-version SNMP engine
//!
//! An RFC 3411-3418 protocol stack acting as command generator
//! (manager) and command responder (agent) in one process, speaking
//! SNMPv1, SNMPv2c and SNMPv3 with USM authentication/privacy and
//! VACM access control over UDP.

pub mod access;
pub mod apps;
pub mod codec;
pub mod config;
pub mod core;
pub mod error;
pub mod mib;
pub mod msgproc;
pub mod proto;
pub mod security;
pub mod transport;
pub mod utils;

pub use error::{Error, ErrorIndication, Result};

/// Engine version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
