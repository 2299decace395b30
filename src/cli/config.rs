//! CLI configuration module
//!
//! Manages configuration for the peer monitor.

use crate::cli::args::CliArgs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use anyhow::Result;

/// Configuration for the peer monitor
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Address to bind to
    pub bind: IpAddr,
    /// Listening port
    pub port: u16,
    /// Silence after which a peer is removed
    pub silence_timeout: Duration,
    /// Interval between silent-peer sweeps
    pub sweep_interval: Duration,
    /// Interval between peer table reports (zero disables them)
    pub stats_interval: Duration,
    /// Report as JSON
    pub json: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            bind: args.bind,
            port: args.port,
            silence_timeout: Duration::from_millis(args.silence_timeout_ms),
            sweep_interval: Duration::from_millis(args.sweep_interval_ms),
            stats_interval: Duration::from_secs(args.stats_interval_secs),
            json: args.json,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.port == 0 {
            return Err(anyhow::anyhow!("Port cannot be 0"));
        }

        if self.silence_timeout.is_zero() {
            return Err(anyhow::anyhow!("silence_timeout must be greater than zero"));
        }

        if self.sweep_interval.is_zero() {
            return Err(anyhow::anyhow!("sweep_interval must be greater than zero"));
        }

        // A sweep slower than the timeout would let peers linger well past it
        if self.sweep_interval > self.silence_timeout {
            return Err(anyhow::anyhow!(
                "sweep_interval ({:?}) must not exceed silence_timeout ({:?})",
                self.sweep_interval,
                self.silence_timeout
            ));
        }

        Ok(())
    }

    /// Get the listen address for the UDP socket
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Get the reporting interval (None when disabled)
    pub fn stats_interval(&self) -> Option<Duration> {
        if self.stats_interval.is_zero() {
            None
        } else {
            Some(self.stats_interval)
        }
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 40102,
            silence_timeout: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(1),
            stats_interval: Duration::from_secs(5),
            json: false,
            quiet: false,
        }
    }
}
