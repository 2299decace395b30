//! simnet-peer-monitor - Main entry point
//!
//! Listens on a UDP port, tracks every peer that sends to it and sweeps out
//! peers that go silent.

use anyhow::{Context, Result};
use simnet_peers::{CliArgs, Config, PacketDispatcher, PeerTable};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        if let Some(location) = panic_info.location() {
            error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    info!("simnet-peer-monitor starting");
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args);
    config.validate()
        .context("Invalid configuration")?;

    display_config(&config);

    let table = Arc::new(PeerTable::new());
    let dispatcher = PacketDispatcher::new(Arc::clone(&table));

    let listen_addr = config.listen_addr();
    let socket = UdpSocket::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind UDP socket on {}", listen_addr))?;
    info!("Listening on {}", socket.local_addr()?);

    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&table), config.clone()));
    let reporter = config
        .stats_interval()
        .map(|interval| tokio::spawn(run_reporter(Arc::clone(&table), interval, config.json)));

    let outcome = tokio::select! {
        result = dispatcher.serve(&socket) => {
            result.context("Receive loop failed")
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested");
            Ok(())
        }
    };

    sweeper.abort();
    if let Some(reporter) = reporter {
        reporter.abort();
    }

    if let Err(e) = &outcome {
        error!("Peer monitor stopped: {:#}", e);
    }

    report_peers(&table, config.json)?;
    info!("simnet-peer-monitor finished ({} peers known)", table.len());
    outcome
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level: {:?}", level);
}

/// Display the effective configuration
fn display_config(config: &Config) {
    if config.is_quiet() {
        return;
    }

    println!("Configuration:");
    println!("  Listen address: {}", config.listen_addr());
    println!("  Silence timeout: {:?}", config.silence_timeout);
    println!("  Sweep interval: {:?}", config.sweep_interval);
    match config.stats_interval() {
        Some(interval) => println!("  Report interval: {:?}", interval),
        None => println!("  Report interval: disabled"),
    }
    println!("  Report format: {}", if config.json { "json" } else { "log" });
    println!();
}

/// Periodically remove peers that stopped talking
async fn run_sweeper(table: Arc<PeerTable>, config: Config) {
    info!(
        "Starting silent peer sweep (interval: {:?}, timeout: {:?})",
        config.sweep_interval, config.silence_timeout
    );
    let mut interval = tokio::time::interval(config.sweep_interval);

    loop {
        interval.tick().await;
        let removed = table.remove_silent_peers(config.silence_timeout);
        trace!("Sweep removed {} peers", removed.len());
    }
}

/// Periodically report the peer table
async fn run_reporter(table: Arc<PeerTable>, every: Duration, json: bool) {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Err(e) = report_peers(&table, json) {
            error!("Failed to report peers: {}", e);
        }
    }
}

fn report_peers(table: &PeerTable, json: bool) -> Result<()> {
    if json {
        let stats = table.stats();
        println!("{}", serde_json::to_string(&stats).context("Failed to encode peer stats")?);
    } else {
        info!("{} peers known", table.len());
        table.log_peers();
    }
    Ok(())
}
