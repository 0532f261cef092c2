//! Entity Store Module
//!
//! This module provides the in-memory book of open orders and in-flight
//! trades. It is the single source of truth for entity state: ids are
//! allocated here, orders are consumed into trades here, and the recovery
//! driver replays the command journal through the same primitives the live
//! dispatcher uses.
//!
//! The store is exclusively owned by the engine task - there is no interior
//! locking. All primitives are synchronous and atomic with respect to each
//! other.

use serde_json::{json, Map, Value};

use crate::protocol::Command;

/// Order payload field naming the maker's payout/refund address.
const ORDER_ADDRESS_FIELD: &str = "getAddress_";

// ============================================================================
// ENTITY DATA STRUCTURES
// ============================================================================

/// A published offer to swap one currency for another.
///
/// The payload (amounts, currencies, counter-address, timestamps) is opaque
/// to the coordinator and preserved verbatim for redistribution; only the
/// maker address field is interpreted, as a routing key. Orders are never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Server-assigned identifier, strictly increasing from 1
    pub id: u64,
    /// Client-supplied order fields, preserved verbatim
    payload: Map<String, Value>,
}

impl Order {
    /// Maker address claimed by this order (empty when the payload omits it).
    pub fn address(&self) -> &str {
        self.payload
            .get(ORDER_ADDRESS_FIELD)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Wire encoding: the stored payload with the server-assigned `id`
    /// inserted (overwriting any client-supplied value).
    pub fn to_json(&self) -> Value {
        let mut obj = self.payload.clone();
        obj.insert("id".to_string(), json!(self.id));
        Value::Object(obj)
    }
}

/// An accepted order transitioning through an HTLC-style atomic swap.
///
/// The seven transaction/contract slots and the two commission flags are
/// filled in by `update_trade` commands as the two wallets progress the swap
/// on-chain. Trades are never deleted; history is retained for the life of
/// the process.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    /// Server-assigned identifier, disjoint counter from order ids
    pub id: u64,
    /// The consumed order (its maker address routes notifications)
    pub order: Order,
    /// Address of the peer that accepted the order
    pub initiator_address: String,
    pub secret_hash: String,
    pub contract_initiator: String,
    pub contract_participant: String,
    pub initiator_contract_transaction: String,
    pub participant_contract_transaction: String,
    pub initiator_redemption_transaction: String,
    pub participant_redemption_transaction: String,
    /// Monotonic: once true, never reverts
    pub initiator_commission_paid: bool,
    /// Monotonic: once true, never reverts
    pub participant_commission_paid: bool,
}

impl Trade {
    fn new(id: u64, order: Order, initiator_address: String) -> Self {
        Self {
            id,
            order,
            initiator_address,
            secret_hash: String::new(),
            contract_initiator: String::new(),
            contract_participant: String::new(),
            initiator_contract_transaction: String::new(),
            participant_contract_transaction: String::new(),
            initiator_redemption_transaction: String::new(),
            participant_redemption_transaction: String::new(),
            initiator_commission_paid: false,
            participant_commission_paid: false,
        }
    }

    /// Maker address of the embedded order.
    pub fn maker_address(&self) -> &str {
        self.order.address()
    }

    /// Wire encoding. The commission flags keep the wire spelling
    /// (`commissionInitiatorPaid` / `commissionParticipantPaid`) on output
    /// as well as input.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "order": self.order.to_json(),
            "initiatorAddress": self.initiator_address,
            "secretHash": self.secret_hash,
            "contractInitiator": self.contract_initiator,
            "contractParticipant": self.contract_participant,
            "initiatorContractTransaction": self.initiator_contract_transaction,
            "participantContractTransaction": self.participant_contract_transaction,
            "initiatorRedemptionTransaction": self.initiator_redemption_transaction,
            "participantRedemptionTransaction": self.participant_redemption_transaction,
            "commissionInitiatorPaid": self.initiator_commission_paid,
            "commissionParticipantPaid": self.participant_commission_paid,
        })
    }

    /// Applies an `update_trade` payload.
    ///
    /// The seven opaque slots are overwritten from the payload (an absent or
    /// non-string field overwrites with the empty string, matching the
    /// original wire behavior). The commission flags are a monotonic OR:
    /// they flip to true when the payload says so and never flip back.
    fn apply_update(&mut self, payload: &Map<String, Value>) {
        let field = |name: &str| -> String {
            payload
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        };

        self.secret_hash = field("secretHash");
        self.contract_initiator = field("contractInitiator");
        self.contract_participant = field("contractParticipant");
        self.initiator_contract_transaction = field("initiatorContractTransaction");
        self.participant_contract_transaction = field("participantContractTransaction");
        self.initiator_redemption_transaction = field("initiatorRedemptionTransaction");
        self.participant_redemption_transaction = field("participantRedemptionTransaction");

        let flag = |name: &str| -> bool {
            payload.get(name).and_then(Value::as_bool).unwrap_or(false)
        };

        if !self.initiator_commission_paid {
            self.initiator_commission_paid = flag("commissionInitiatorPaid");
        }
        if !self.participant_commission_paid {
            self.participant_commission_paid = flag("commissionParticipantPaid");
        }
    }
}

// ============================================================================
// ENTITY STORE
// ============================================================================

/// In-memory store of orders and trades with monotonic id allocation.
///
/// Ordered maps keep `init` replies and snapshots deterministic (ascending
/// id order). Counters start at 0 and pre-increment, so the first id of each
/// kind is 1; after journal replay the counters resume past the maximum
/// replayed id.
#[derive(Debug, Default)]
pub struct EngineStore {
    orders: std::collections::BTreeMap<u64, Order>,
    trades: std::collections::BTreeMap<u64, Trade>,
    cur_order_id: u64,
    cur_trade_id: u64,
}

impl EngineStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next order id and stores the order.
    ///
    /// # Returns
    ///
    /// The newly created order.
    pub fn create_order(&mut self, payload: Map<String, Value>) -> &Order {
        self.cur_order_id += 1;
        let order = Order {
            id: self.cur_order_id,
            payload,
        };
        self.orders.entry(order.id).or_insert(order)
    }

    /// Removes an order from the book.
    ///
    /// # Returns
    ///
    /// `true` when the order existed and was removed, `false` otherwise.
    pub fn delete_order(&mut self, id: u64) -> bool {
        self.orders.remove(&id).is_some()
    }

    /// Consumes an order into a new trade.
    ///
    /// The order is removed from the book and moved into the trade; the next
    /// trade id is allocated from the trade counter.
    ///
    /// # Returns
    ///
    /// The new trade, or `None` when the order id is not in the book.
    pub fn create_trade(&mut self, order_id: u64, initiator_address: String) -> Option<&Trade> {
        let order = self.orders.remove(&order_id)?;
        self.cur_trade_id += 1;
        let trade = Trade::new(self.cur_trade_id, order, initiator_address);
        Some(self.trades.entry(trade.id).or_insert(trade))
    }

    /// Applies an `update_trade` payload to the trade named by its `id`
    /// field.
    ///
    /// # Returns
    ///
    /// The updated trade, or `None` when the id is not in the store.
    pub fn update_trade(&mut self, payload: &Map<String, Value>) -> Option<&Trade> {
        let id = payload.get("id").and_then(Value::as_u64).unwrap_or(0);
        let trade = self.trades.get_mut(&id)?;
        trade.apply_update(payload);
        Some(trade)
    }

    /// Applies a mutation command without producing any output.
    ///
    /// This is the entry point the recovery driver uses: the four mutation
    /// commands go through exactly the primitives above, and the read-only
    /// commands are ignored (they never appear in the journal).
    pub fn apply_mutation(&mut self, command: &Command) {
        match command {
            Command::CreateOrder { order } => {
                self.create_order(order.clone());
            }
            Command::DeleteOrder { id } => {
                self.delete_order(*id);
            }
            Command::CreateTrade { order_id, address } => {
                self.create_trade(*order_id, address.clone());
            }
            Command::UpdateTrade { trade } => {
                self.update_trade(trade);
            }
            Command::Init { .. } | Command::RequestSwapCommission { .. } => {}
        }
    }

    /// Open orders in ascending id order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Trades in ascending id order.
    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.values()
    }

    /// Number of open orders.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Number of trades.
    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Wire-encoded snapshot of both books, used to compare states in tests
    /// and to build `init` replies.
    pub fn snapshot(&self) -> (Vec<Value>, Vec<Value>) {
        let orders = self.orders.values().map(Order::to_json).collect();
        let trades = self.trades.values().map(Trade::to_json).collect();
        (orders, trades)
    }
}
