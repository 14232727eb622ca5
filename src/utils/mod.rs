//! Utility modules for the ferrosnmp engine

pub mod logger;

pub use logger::setup_logging;
