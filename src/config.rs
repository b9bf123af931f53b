//! Command-line configuration.

use crate::connection::DEFAULT_MAX_BUFFER;
use clap::Parser;

/// pulsekv - a minimal in-memory key-value store with per-key expiry
#[derive(Debug, Clone, Parser)]
#[command(name = "pulsekv", version, about)]
pub struct Config {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Log level filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Maximum header bytes buffered for one incomplete request
    #[arg(long, default_value_t = DEFAULT_MAX_BUFFER)]
    pub max_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            log_level: "info".to_string(),
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli() {
        let parsed = Config::try_parse_from(["pulsekv"]).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.bind_address(), defaults.bind_address());
        assert_eq!(parsed.bind_address(), "127.0.0.1:6379");
        assert_eq!(parsed.max_buffer, defaults.max_buffer);
        assert_eq!(parsed.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let parsed = Config::try_parse_from([
            "pulsekv",
            "--host",
            "0.0.0.0",
            "-p",
            "6380",
            "--max-buffer",
            "1024",
        ])
        .unwrap();
        assert_eq!(parsed.bind_address(), "0.0.0.0:6380");
        assert_eq!(parsed.max_buffer, 1024);
    }

    #[test]
    fn test_invalid_port() {
        assert!(Config::try_parse_from(["pulsekv", "--port", "notaport"]).is_err());
    }
}
