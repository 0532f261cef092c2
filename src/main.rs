//! Swap Coordinator Service
//!
//! A coordination server for peer-to-peer atomic swap negotiation. Wallet
//! clients connect over persistent TCP sessions, announce the addresses they
//! control, publish orders and drive accepted orders through a trade state
//! machine. The coordinator holds no funds and performs no chain I/O.
//!
//! ## Overview
//!
//! On startup the service:
//! 1. Initializes logging
//! 2. Loads configuration (TOML file plus command-line overrides)
//! 3. Replays the command journal to rebuild the in-memory state
//! 4. Binds the TCP listener and serves until shutdown

use anyhow::Result;
use tracing::info;

use swap_coordinator::{CommandJournal, Config, EngineStore, SwapServer, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    info!("Starting Swap Coordinator");

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Check for help flag
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("Swap Coordinator");
        println!();
        println!("Usage: swap-coordinator [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --port <n>       Listen port (overrides the configured port)");
        println!("  --config <path>  Use custom config file path");
        println!("  --help, -h       Show this help message");
        println!();
        println!("Environment variables:");
        println!("  SWAP_COORDINATOR_CONFIG_PATH    Path to config file (overrides --config)");
        return Ok(());
    }

    // Check for custom config path
    for (i, arg) in args.iter().enumerate() {
        if arg == "--config" && i + 1 < args.len() {
            std::env::set_var("SWAP_COORDINATOR_CONFIG_PATH", &args[i + 1]);
            info!("Using custom config: {}", args[i + 1]);
            break;
        }
    }

    // Load configuration (falls back to defaults when no file exists)
    let mut config = Config::load()?;

    // Check for a port override
    for (i, arg) in args.iter().enumerate() {
        if arg == "--port" && i + 1 < args.len() {
            config.server.port = args[i + 1]
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid --port value: {}", args[i + 1]))?;
            break;
        }
    }

    config.validate()?;

    // Rebuild the in-memory state from the command journal before any client
    // can connect
    let journal = CommandJournal::new(&config.storage.journal_path);
    let mut store = EngineStore::new();
    let applied = journal.replay(&mut store);
    info!(
        "Recovered {} commands: {} open orders, {} trades",
        applied,
        store.order_count(),
        store.trade_count()
    );

    let server = SwapServer::bind(&config).await?;
    info!(
        "Swap coordinator listening on {}, version = {}",
        server.local_addr()?,
        VERSION
    );

    server.run(store, journal).await
}
