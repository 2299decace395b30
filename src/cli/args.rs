//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::Parser;
use std::net::IpAddr;

/// CLI arguments for the peer monitor
#[derive(Debug, Parser)]
#[command(name = "simnet-peer-monitor")]
#[command(about = "Tracks simulation peers talking to a UDP port", long_about = None)]
pub struct CliArgs {
    /// Address to bind the UDP socket to
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = 40102)]
    pub port: u16,

    /// Remove peers silent for longer than this many milliseconds
    #[arg(long, default_value_t = 2000)]
    pub silence_timeout_ms: u64,

    /// How often to sweep for silent peers, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub sweep_interval_ms: u64,

    /// How often to report the peer table, in seconds (0 = never)
    #[arg(long, default_value_t = 5)]
    pub stats_interval_secs: u64,

    /// Report peers as JSON instead of log lines
    #[arg(long)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
