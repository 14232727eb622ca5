//! Logging setup for the ferrosnmp engine
//!
//! One subscriber, one writer: stdout, or a daily-rolling file derived
//! from the configured path.

use std::path::{Path, PathBuf};

use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};

/// Install the global subscriber per the `[logging]` section. The
/// non-blocking writer guard must outlive the process, so it is
/// deliberately leaked here.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_level(&config.level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let writer = match &config.file {
        Some(file) => {
            let (directory, stem) = rolling_parts(file);
            let appender = rolling::RollingFileAppender::builder()
                .rotation(rolling::Rotation::DAILY)
                .filename_prefix(stem)
                .filename_suffix("log")
                .build(directory)
                .map_err(|e| Error::internal(format!("log file appender: {}", e)))?;
            let (writer, guard) = non_blocking(appender);
            std::mem::forget(guard);
            BoxMakeWriter::new(writer)
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let builder = fmt().with_env_filter(filter).with_writer(writer);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Full => builder.init(),
    }

    info!(level = %config.level, file = ?config.file, "logging initialised");
    Ok(())
}

fn parse_level(level: &str) -> Result<Level> {
    level
        .parse()
        .map_err(|_| Error::parse(format!("invalid log level: {}", level)))
}

/// Split a configured log path into the rotation directory and the
/// file-name stem the roller prefixes each day's file with.
fn rolling_parts(file: &str) -> (PathBuf, String) {
    let path = Path::new(file);
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("ferrosnmp")
        .to_string();
    (directory, stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("Error").unwrap(), Level::ERROR);
        assert!(parse_level("noisy").is_err());
        assert!(parse_level("").is_err());
    }

    #[test]
    fn test_rolling_parts() {
        let (dir, stem) = rolling_parts("/var/log/ferrosnmp.log");
        assert_eq!(dir, PathBuf::from("/var/log"));
        assert_eq!(stem, "ferrosnmp");

        let (dir, stem) = rolling_parts("engine.log");
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(stem, "engine");
    }
}
