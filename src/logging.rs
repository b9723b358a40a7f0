//! Logging setup
//!
//! Lines go to stderr and, when enabled, are appended to the log file in the
//! data directory as well.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use env_logger::Target;
use log::LevelFilter;

use crate::config::LoggingConfig;

/// Writes every buffer to both stderr and a file
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}

pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Initialise the global logger. `RUST_LOG` overrides the configured level.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(config: &LoggingConfig, log_file: Option<&Path>) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_level(&config.level))
        .parse_default_env()
        .format_timestamp_millis();

    if config.log_to_file {
        if let Some(path) = log_file {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    builder.target(Target::Pipe(Box::new(Tee { file })));
                }
                Err(e) => eprintln!("Could not open log file {:?}: {}", path, e),
            }
        }
    }

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN "), LevelFilter::Warn);
        assert_eq!(parse_level("nonsense"), LevelFilter::Info);
        assert_eq!(parse_level("off"), LevelFilter::Off);
    }
}
