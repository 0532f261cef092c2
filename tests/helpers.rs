//! Shared test helpers
//!
//! This module provides helper functions used by the test suites.
//!
//! The module is organized into several categories:
//! - **Constants**: Dummy addresses and transaction ids used across tests
//! - **Command Builders**: Functions building wire-shaped command objects
//! - **Server Harness**: Spawning a coordinator on an ephemeral port
//! - **Test Client**: A line-framed JSON client over a real TCP socket

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use swap_coordinator::{CommandJournal, Config, EngineStore, SwapServer};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Dummy maker payout address (the order's `getAddress_`)
#[allow(dead_code)]
pub const DUMMY_MAKER_ADDR: &str = "mkr1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";

/// Dummy taker address supplied with `create_trade`
#[allow(dead_code)]
pub const DUMMY_TAKER_ADDR: &str = "tkr1q34aq5drpuwy3wgl9lhup9893qhkgrvldzq3vta";

/// Dummy address for a connected bystander client
#[allow(dead_code)]
pub const DUMMY_BYSTANDER_ADDR: &str = "byst1q5l9v8wxj206c92tchpqmaf32ym9nr7e0d68xa";

/// Dummy address that never appears in any order or trade
#[allow(dead_code)]
pub const DUMMY_UNRELATED_ADDR: &str = "unrl1q8gxtmvp0jc29a4hy9ep9dqyn30yk03w86cmkf";

/// Dummy HTLC secret hash (64 hex characters)
#[allow(dead_code)]
pub const DUMMY_SECRET_HASH: &str =
    "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

/// Dummy initiator-side contract script
#[allow(dead_code)]
pub const DUMMY_CONTRACT_INITIATOR: &str = "6382012088a8209f86d081884c7d65";

/// Dummy participant-side contract script
#[allow(dead_code)]
pub const DUMMY_CONTRACT_PARTICIPANT: &str = "6382012088a820b1946ac92492d234";

/// Dummy contract transaction id (64 hex characters)
#[allow(dead_code)]
pub const DUMMY_CONTRACT_TX: &str =
    "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456";

/// Dummy redemption transaction id (64 hex characters)
#[allow(dead_code)]
pub const DUMMY_REDEMPTION_TX: &str =
    "6b86b273ff34fce19d6b804eff5a3f5747ada4eaa22f1d49c01e52ddb7875b4b";

// ============================================================================
// COMMAND BUILDERS
// ============================================================================

/// Build an opaque order payload owned by the given maker address.
#[allow(dead_code)]
pub fn build_order_payload(address: &str) -> Value {
    json!({
        "getAddress_": address,
        "fromCur": "BTC",
        "toCur": "LTC",
        "fromAmount": 10,
        "toAmount": 550,
    })
}

/// Build a `create_order` command for the given maker address.
#[allow(dead_code)]
pub fn create_order_command(address: &str) -> Value {
    json!({ "command": "create_order", "order": build_order_payload(address) })
}

/// Build a `delete_order` command.
#[allow(dead_code)]
pub fn delete_order_command(id: u64) -> Value {
    json!({ "command": "delete_order", "id": id })
}

/// Build an `init` command announcing the given addresses under one currency.
#[allow(dead_code)]
pub fn init_command(addrs: &[&str]) -> Value {
    json!({ "command": "init", "curs": [{ "cur": "BTC", "addrs": addrs }] })
}

/// Build a `create_trade` command accepting the given order.
#[allow(dead_code)]
pub fn create_trade_command(order_id: u64, address: &str) -> Value {
    json!({ "command": "create_trade", "orderId": order_id, "address": address })
}

/// Build an `update_trade` command carrying the given extra trade fields.
#[allow(dead_code)]
pub fn update_trade_command(id: u64, fields: Value) -> Value {
    let mut trade = json!({ "id": id });
    if let (Some(trade_obj), Some(extra)) = (trade.as_object_mut(), fields.as_object()) {
        for (key, value) in extra {
            trade_obj.insert(key.clone(), value.clone());
        }
    }
    json!({ "command": "update_trade", "trade": trade })
}

// ============================================================================
// SERVER HARNESS
// ============================================================================

/// Reserve an ephemeral port for a test server.
#[allow(dead_code)]
pub fn get_available_port() -> u16 {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
    let port = listener.local_addr().expect("read local addr").port();
    drop(listener);
    port
}

/// Spawn a coordinator on an ephemeral port, replaying the given journal
/// exactly the way `main` does.
///
/// Aborting the returned handle kills the server ungracefully; spawning
/// again with the same journal path exercises crash recovery.
#[allow(dead_code)]
pub async fn spawn_server(journal_path: &Path) -> (SocketAddr, JoinHandle<()>) {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = get_available_port();
    config.storage.journal_path = journal_path.to_path_buf();
    config.validate().expect("test config is valid");

    let journal = CommandJournal::new(&config.storage.journal_path);
    let mut store = EngineStore::new();
    journal.replay(&mut store);

    let server = SwapServer::bind(&config).await.expect("bind test server");
    let addr = server.local_addr().expect("read listener addr");
    let handle = tokio::spawn(async move {
        let _ = server.run(store, journal).await;
    });
    (addr, handle)
}

/// Read the journal back as parsed JSON objects, one per line.
#[allow(dead_code)]
pub fn read_journal_lines(journal_path: &Path) -> Vec<Value> {
    let content = std::fs::read_to_string(journal_path).expect("read journal file");
    content
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).expect("journal line is JSON"))
        .collect()
}

// ============================================================================
// TEST CLIENT
// ============================================================================

/// A wallet-client stand-in speaking the LF-delimited JSON protocol.
#[allow(dead_code)]
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect to a test server.
    #[allow(dead_code)]
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to server");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Send one command as a complete frame.
    #[allow(dead_code)]
    pub async fn send(&mut self, command: &Value) {
        let mut line = command.to_string();
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("write command frame");
    }

    /// Send raw bytes without framing (for split/partial frame tests).
    #[allow(dead_code)]
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer
            .write_all(bytes)
            .await
            .expect("write raw bytes");
    }

    /// Receive the next frame, with a timeout so a missing frame fails the
    /// test instead of hanging it.
    #[allow(dead_code)]
    pub async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let read = timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a frame")
            .expect("read frame");
        assert!(read > 0, "connection closed while waiting for a frame");
        serde_json::from_str(&line).expect("frame is a JSON object")
    }
}
