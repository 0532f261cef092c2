//! Swap Coordinator Library
//!
//! This crate provides a coordination server for peer-to-peer atomic swap
//! negotiation. Wallet clients connect over persistent TCP sessions, announce
//! the blockchain addresses they control, publish orders, and drive accepted
//! orders through a trade state machine. The coordinator holds no funds and
//! performs no chain I/O - it only stores the contract and redemption
//! transaction ids the clients report.

pub mod config;
pub mod engine;
pub mod journal;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use config::{Config, ServerConfig, StorageConfig};
pub use engine::{EngineStore, Order, Trade};
pub use journal::CommandJournal;
pub use protocol::Command;
pub use server::SwapServer;

/// Version literal logged on successful listen.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
