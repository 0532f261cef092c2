//! Wire Protocol Module
//!
//! This module defines the command decoder and the reply frame builders for
//! the LF-delimited JSON protocol. Inbound lines are parsed once into a
//! tagged [`Command`] enum and dispatched exhaustively; outbound frames are
//! built here so every handler emits the exact wire shapes, including the
//! historical `reasone` misspelling in `create_trade_failed`, which is part
//! of the wire contract.

use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Map, Value};

// ============================================================================
// COMMAND DECODING
// ============================================================================

/// A client command, decoded from a `{"command": <name>, ...}` object.
///
/// Field decoding is deliberately lenient: a missing `id`/`orderId` decodes
/// as 0, missing strings as empty, missing collections as empty and missing
/// booleans as false. Looking up id 0 never matches anything, so malformed
/// commands fall through the same not-found paths the wire contract
/// specifies.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Announce the addresses this peer controls and request a state snapshot.
    Init {
        #[serde(default)]
        curs: Vec<CurrencyAddrs>,
    },
    /// Vestigial commission query; claims addresses like `init` does.
    RequestSwapCommission {
        #[serde(default)]
        curs: Vec<CurrencyAddrs>,
    },
    /// Publish a new order.
    CreateOrder {
        #[serde(default)]
        order: Map<String, Value>,
    },
    /// Withdraw an open order.
    DeleteOrder {
        #[serde(default)]
        id: u64,
    },
    /// Accept an open order, consuming it into a trade.
    CreateTrade {
        #[serde(default, rename = "orderId")]
        order_id: u64,
        #[serde(default)]
        address: String,
    },
    /// Report swap progress on an existing trade.
    UpdateTrade {
        #[serde(default)]
        trade: Map<String, Value>,
    },
}

/// One currency block of an `init` / `request_swap_commission` command.
///
/// The currency grouping is informational; only the addresses are extracted.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyAddrs {
    #[serde(default)]
    pub addrs: Vec<String>,
}

impl Command {
    /// Addresses announced by an `init` / `request_swap_commission` command,
    /// flattened across currency blocks in announcement order.
    pub fn announced_addrs(curs: &[CurrencyAddrs]) -> impl Iterator<Item = &str> {
        curs.iter()
            .flat_map(|cur| cur.addrs.iter().map(String::as_str))
    }
}

/// Decodes one complete line into the parsed JSON object and the typed
/// command.
///
/// The raw object is returned alongside the command because accepted
/// mutations are journaled as the original command, compact-encoded - the
/// server-assigned ids are never persisted.
///
/// # Returns
///
/// - `Ok((object, command))` - The line is a JSON object with a known command
/// - `Err(anyhow::Error)` - Not JSON, not an object, or an unknown/malformed
///   command; the caller skips and logs the line
pub fn decode_line(line: &[u8]) -> anyhow::Result<(Value, Command)> {
    let value: Value = serde_json::from_slice(line).context("not valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("top-level value is not an object");
    }
    let command: Command =
        serde_json::from_value(value.clone()).context("unknown or malformed command")?;
    Ok((value, command))
}

// ============================================================================
// REPLY FRAMES
// ============================================================================

/// `init_success` frame: the full order book plus the trades relevant to the
/// addresses the client just announced. The `commissions` array is vestigial
/// and always empty.
pub fn init_success(orders: Vec<Value>, trades: Vec<Value>) -> String {
    frame(json!({
        "reply": "init_success",
        "isActual": true,
        "orders": orders,
        "trades": trades,
        "commissions": [],
    }))
}

/// `request_swap_commission_success` frame.
pub fn request_swap_commission_success() -> String {
    frame(json!({
        "reply": "request_swap_commission_success",
        "commissions": [],
    }))
}

/// `create_order_success` frame, sent to the order's creator.
pub fn create_order_success(order: &Value) -> String {
    frame(json!({ "reply": "create_order_success", "order": order }))
}

/// `create_order` frame, broadcast to every other connection.
pub fn create_order_broadcast(order: &Value) -> String {
    frame(json!({ "reply": "create_order", "order": order }))
}

/// `delete_order_success` frame, sent to the sender whether or not the order
/// existed.
pub fn delete_order_success(id: u64) -> String {
    frame(json!({ "reply": "delete_order_success", "id": id }))
}

/// `delete_order` frame, broadcast when an order leaves the book - by
/// deletion, or from a bystander's point of view when it is consumed by a
/// trade.
pub fn delete_order_broadcast(id: u64) -> String {
    frame(json!({ "reply": "delete_order", "id": id }))
}

/// `create_trade_success` frame, sent to the taker.
pub fn create_trade_success(trade: &Value) -> String {
    frame(json!({ "reply": "create_trade_success", "trade": trade }))
}

/// `create_trade` frame, delivered to the maker's connection.
pub fn create_trade_broadcast(trade: &Value) -> String {
    frame(json!({ "reply": "create_trade", "trade": trade }))
}

/// `create_trade_failed` frame. The misspelt `reasone` key is wire contract.
pub fn create_trade_failed() -> String {
    frame(json!({
        "reply": "create_trade_failed",
        "reasone": "order out of date",
    }))
}

/// `update_trade_success` frame, sent to the sender whether or not the trade
/// existed.
pub fn update_trade_success() -> String {
    frame(json!({ "reply": "update_trade_success" }))
}

/// `update_trade` frame, delivered to the trade's counterparty.
pub fn update_trade_broadcast(trade: &Value) -> String {
    frame(json!({ "reply": "update_trade", "trade": trade }))
}

/// Compact-encodes a reply and terminates it with the LF framing byte.
fn frame(value: Value) -> String {
    let mut out = value.to_string();
    out.push('\n');
    out
}
