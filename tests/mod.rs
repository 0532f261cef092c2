//! Test module organization
//!
//! This module re-exports test helpers for use in test files.

mod helpers;

#[allow(unused_imports)]
pub use helpers::{
    build_order_payload, create_order_command, create_trade_command, delete_order_command,
    get_available_port, init_command, read_journal_lines, spawn_server, update_trade_command,
    TestClient, DUMMY_BYSTANDER_ADDR, DUMMY_CONTRACT_INITIATOR, DUMMY_CONTRACT_PARTICIPANT,
    DUMMY_CONTRACT_TX, DUMMY_MAKER_ADDR, DUMMY_REDEMPTION_TX, DUMMY_SECRET_HASH,
    DUMMY_TAKER_ADDR, DUMMY_UNRELATED_ADDR,
};
