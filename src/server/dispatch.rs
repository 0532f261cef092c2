//! Command Dispatcher
//!
//! Executes decoded commands against the entity store and routes the
//! resulting frames: reply to the sender first, then the fan-out to whichever
//! peers the command concerns. Runs entirely on the engine consumer task, so
//! each command - including its journal append and all of its sends - is
//! atomic with respect to every other command.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::SessionRegistry;
use crate::engine::EngineStore;
use crate::journal::CommandJournal;
use crate::protocol::{self, Command, CurrencyAddrs};

/// Single-writer command dispatcher owning all engine state.
pub(crate) struct Dispatcher {
    store: EngineStore,
    registry: SessionRegistry,
    journal: CommandJournal,
}

impl Dispatcher {
    pub(crate) fn new(store: EngineStore, journal: CommandJournal) -> Self {
        Self {
            store,
            registry: SessionRegistry::new(),
            journal,
        }
    }

    /// Registers a new connection in the session registry.
    pub(crate) fn client_connected(&mut self, conn_id: u64, outbound: mpsc::UnboundedSender<String>) {
        self.registry.open(conn_id, outbound);
        info!(
            "New connection id = {}, active connections = {}",
            conn_id,
            self.registry.active()
        );
    }

    /// Drops a connection, its outbound channel and every address it owned.
    pub(crate) fn client_disconnected(&mut self, conn_id: u64) {
        self.registry.close(conn_id);
        info!(
            "Client disconnected, active connections = {}",
            self.registry.active()
        );
    }

    /// Decodes and executes one complete line from a connection.
    ///
    /// Undecodable lines and unknown commands are skipped and logged; no
    /// reply is sent for them.
    pub(crate) fn handle_line(&mut self, conn_id: u64, line: &[u8]) {
        debug!("client {} sent {}", conn_id, String::from_utf8_lossy(line));

        let (raw, command) = match protocol::decode_line(line) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(
                    "discarding line from client {}: {} ({:#})",
                    conn_id,
                    String::from_utf8_lossy(line),
                    err
                );
                return;
            }
        };

        match command {
            Command::Init { curs } => self.handle_init(conn_id, &curs),
            Command::RequestSwapCommission { curs } => {
                self.handle_request_swap_commission(conn_id, &curs)
            }
            Command::CreateOrder { order } => self.handle_create_order(conn_id, &raw, order),
            Command::DeleteOrder { id } => self.handle_delete_order(conn_id, &raw, id),
            Command::CreateTrade { order_id, address } => {
                self.handle_create_trade(conn_id, &raw, order_id, address)
            }
            Command::UpdateTrade { trade } => self.handle_update_trade(conn_id, &raw, &trade),
        }
    }

    /// `init`: claim every announced address, then reply with the full order
    /// book and the trades relevant to those addresses.
    ///
    /// The relevance filter deliberately uses only the addresses announced
    /// in this command, not the connection's cumulative claims.
    fn handle_init(&mut self, conn_id: u64, curs: &[CurrencyAddrs]) {
        let mut announced: HashSet<&str> = HashSet::new();
        for addr in Command::announced_addrs(curs) {
            self.registry.claim(addr.to_string(), conn_id);
            announced.insert(addr);
        }

        let orders: Vec<Value> = self.store.orders().map(|order| order.to_json()).collect();
        let trades: Vec<Value> = self
            .store
            .trades()
            .filter(|trade| {
                announced.contains(trade.maker_address())
                    || announced.contains(trade.initiator_address.as_str())
            })
            .map(|trade| trade.to_json())
            .collect();

        self.registry
            .send(conn_id, protocol::init_success(orders, trades));
    }

    /// `request_swap_commission`: same address claiming as `init`; the reply
    /// carries the vestigial empty commissions array and nothing else.
    fn handle_request_swap_commission(&mut self, conn_id: u64, curs: &[CurrencyAddrs]) {
        for addr in Command::announced_addrs(curs) {
            self.registry.claim(addr.to_string(), conn_id);
        }
        self.registry
            .send(conn_id, protocol::request_swap_commission_success());
    }

    /// `create_order`: allocate the order, claim its maker address for the
    /// sender, journal the command, reply to the sender and announce the
    /// order to everyone else.
    fn handle_create_order(&mut self, conn_id: u64, raw: &Value, payload: Map<String, Value>) {
        let order = self.store.create_order(payload);
        let order_json = order.to_json();
        let maker_address = order.address().to_string();

        self.registry.claim(maker_address, conn_id);
        self.journal.append(raw);
        self.registry
            .send(conn_id, protocol::create_order_success(&order_json));
        self.registry
            .broadcast_except(&protocol::create_order_broadcast(&order_json), &[conn_id]);
    }

    /// `delete_order`: the sender always gets `delete_order_success`, even
    /// when the id was unknown; the journal append and the broadcast happen
    /// only on an actual removal.
    fn handle_delete_order(&mut self, conn_id: u64, raw: &Value, id: u64) {
        let deleted = self.store.delete_order(id);
        if deleted {
            self.journal.append(raw);
        }
        self.registry
            .send(conn_id, protocol::delete_order_success(id));
        if deleted {
            self.registry
                .broadcast_except(&protocol::delete_order_broadcast(id), &[conn_id]);
        }
    }

    /// `create_trade`: claim the taker address, then consume the order.
    ///
    /// On success the taker gets the trade, the maker's connection gets a
    /// `create_trade` notification, and every bystander sees the order
    /// disappear as a `delete_order`. On a stale order id the taker gets
    /// `create_trade_failed` and nothing else happens.
    fn handle_create_trade(&mut self, conn_id: u64, raw: &Value, order_id: u64, address: String) {
        self.registry.claim(address.clone(), conn_id);

        match self.store.create_trade(order_id, address) {
            Some(trade) => {
                let trade_json = trade.to_json();
                let maker_address = trade.maker_address().to_string();

                self.journal.append(raw);
                self.registry
                    .send(conn_id, protocol::create_trade_success(&trade_json));

                let maker_conn = self.registry.resolve(&maker_address);
                if let Some(maker_conn) = maker_conn {
                    if maker_conn != conn_id {
                        self.registry
                            .send(maker_conn, protocol::create_trade_broadcast(&trade_json));
                    }
                }

                let mut skip = vec![conn_id];
                skip.extend(maker_conn);
                self.registry
                    .broadcast_except(&protocol::delete_order_broadcast(order_id), &skip);
            }
            None => {
                self.registry.send(conn_id, protocol::create_trade_failed());
            }
        }
    }

    /// `update_trade`: the sender always gets `update_trade_success`. When
    /// the trade exists, the command is journaled and the counterparty is
    /// notified: with both the maker and initiator addresses resolved, the
    /// maker being the sender routes to the initiator, anything else routes
    /// to the maker; an unmapped address drops the notification silently.
    fn handle_update_trade(&mut self, conn_id: u64, raw: &Value, payload: &Map<String, Value>) {
        let updated = self.store.update_trade(payload).map(|trade| {
            (
                trade.to_json(),
                trade.maker_address().to_string(),
                trade.initiator_address.clone(),
            )
        });

        if updated.is_some() {
            self.journal.append(raw);
        }
        self.registry
            .send(conn_id, protocol::update_trade_success());

        if let Some((trade_json, maker_address, initiator_address)) = updated {
            let maker_conn = self.registry.resolve(&maker_address);
            let initiator_conn = self.registry.resolve(&initiator_address);
            let target = match (maker_conn, initiator_conn) {
                (Some(maker), Some(initiator)) => {
                    Some(if maker == conn_id { initiator } else { maker })
                }
                _ => None,
            };

            if let Some(target) = target {
                self.registry
                    .send(target, protocol::update_trade_broadcast(&trade_json));
            }
        }
    }
}
