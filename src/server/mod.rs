//! TCP Server Module
//!
//! This module provides the TCP listener, the session registry and the
//! per-connection plumbing for the swap coordinator. The wire protocol is
//! LF-delimited JSON in both directions, with no length prefix.
//!
//! ## Concurrency model
//!
//! All engine state is owned by a single consumer task. Connection reader
//! tasks only frame bytes into complete lines and forward them; the consumer
//! task decodes and executes one command at a time - mutation, journal
//! append, reply and broadcasts - so every command is atomic with respect to
//! every other. Writer tasks drain an unbounded per-connection channel, which
//! preserves per-connection frame order and lets the engine enqueue frames
//! without ever blocking on a slow peer.

mod dispatch;

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::Config;
use crate::engine::EngineStore;
use crate::journal::CommandJournal;
use dispatch::Dispatcher;

// ============================================================================
// SESSION EVENTS
// ============================================================================

/// Events funneled from the connection tasks into the engine consumer task.
pub(crate) enum SessionEvent {
    /// A new connection was accepted; `outbound` carries frames back to it.
    Connected {
        conn_id: u64,
        outbound: mpsc::UnboundedSender<String>,
    },
    /// One complete (non-empty) line arrived on a connection.
    Line { conn_id: u64, line: Vec<u8> },
    /// A connection closed or its socket failed.
    Disconnected { conn_id: u64 },
}

// ============================================================================
// SESSION REGISTRY
// ============================================================================

/// Open connections and the address -> connection routing index.
///
/// The address index is last-writer-wins: whichever connection most recently
/// named an address owns it. Closing a connection removes its outbound
/// channel and every address it owned in one step, so the index never points
/// at a closed connection.
pub(crate) struct SessionRegistry {
    /// Open connections in id order (deterministic broadcast order)
    connections: BTreeMap<u64, mpsc::UnboundedSender<String>>,
    /// Address -> connection id, last writer wins
    addrs: HashMap<String, u64>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            addrs: HashMap::new(),
        }
    }

    /// Registers a newly accepted connection.
    pub(crate) fn open(&mut self, conn_id: u64, outbound: mpsc::UnboundedSender<String>) {
        self.connections.insert(conn_id, outbound);
    }

    /// Removes a connection and every address it owned.
    pub(crate) fn close(&mut self, conn_id: u64) {
        self.addrs.retain(|_, owner| *owner != conn_id);
        self.connections.remove(&conn_id);
    }

    /// Claims an address for a connection (last writer wins).
    pub(crate) fn claim(&mut self, address: String, conn_id: u64) {
        self.addrs.insert(address, conn_id);
    }

    /// Resolves an address to the open connection that owns it.
    pub(crate) fn resolve(&self, address: &str) -> Option<u64> {
        let conn_id = *self.addrs.get(address)?;
        self.connections.contains_key(&conn_id).then_some(conn_id)
    }

    /// Enqueues a frame to one connection. Frames to connections that are
    /// gone are silently dropped.
    pub(crate) fn send(&self, conn_id: u64, frame: String) {
        if let Some(outbound) = self.connections.get(&conn_id) {
            let _ = outbound.send(frame);
        }
    }

    /// Enqueues a frame to every open connection except the listed ones.
    pub(crate) fn broadcast_except(&self, frame: &str, skip: &[u64]) {
        for (conn_id, outbound) in &self.connections {
            if skip.contains(conn_id) {
                continue;
            }
            let _ = outbound.send(frame.to_string());
        }
    }

    /// Number of open connections.
    pub(crate) fn active(&self) -> usize {
        self.connections.len()
    }
}

// ============================================================================
// SERVER
// ============================================================================

/// TCP server for the swap coordination protocol.
pub struct SwapServer {
    listener: TcpListener,
}

impl SwapServer {
    /// Binds the listener on the configured endpoint.
    ///
    /// # Returns
    ///
    /// - `Ok(SwapServer)` - Listener bound and ready to serve
    /// - `Err(anyhow::Error)` - Bind failed
    pub async fn bind(config: &Config) -> anyhow::Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind listener on {}", addr))?;
        Ok(Self { listener })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Serves connections until the process exits.
    ///
    /// Spawns the accept loop and then runs the engine consumer loop on this
    /// task: the store, registry and journal are owned here exclusively, and
    /// session events are executed strictly one at a time.
    pub async fn run(self, store: EngineStore, journal: CommandJournal) -> anyhow::Result<()> {
        let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(1024);
        tokio::spawn(accept_loop(self.listener, event_tx));

        let mut dispatcher = Dispatcher::new(store, journal);
        while let Some(event) = event_rx.recv().await {
            match event {
                SessionEvent::Connected { conn_id, outbound } => {
                    dispatcher.client_connected(conn_id, outbound);
                }
                SessionEvent::Line { conn_id, line } => {
                    dispatcher.handle_line(conn_id, &line);
                }
                SessionEvent::Disconnected { conn_id } => {
                    dispatcher.client_disconnected(conn_id);
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// CONNECTION TASKS
// ============================================================================

/// Accepts connections, assigns monotonic connection ids and spawns the
/// per-connection reader/writer tasks.
///
/// The `Connected` event is sent before the reader task is spawned, so the
/// engine always registers a connection before seeing any of its lines.
async fn accept_loop(listener: TcpListener, events: mpsc::Sender<SessionEvent>) {
    let mut next_conn_id: u64 = 0;
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                next_conn_id += 1;
                let conn_id = next_conn_id;
                let (read_half, write_half) = stream.into_split();
                let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();

                if events
                    .send(SessionEvent::Connected {
                        conn_id,
                        outbound: out_tx,
                    })
                    .await
                    .is_err()
                {
                    return;
                }

                tokio::spawn(write_loop(write_half, out_rx));
                tokio::spawn(read_loop(conn_id, read_half, events.clone()));
            }
            Err(err) => {
                warn!("accept failed: {}", err);
            }
        }
    }
}

/// Reads bytes, frames them into LF-delimited lines and forwards each
/// complete non-empty line to the engine.
///
/// The receive buffer lives here, so a partial line dies with its
/// connection. The trailing remainder after the last LF stays buffered until
/// more bytes arrive.
async fn read_loop(conn_id: u64, mut read_half: OwnedReadHalf, events: mpsc::Sender<SessionEvent>) {
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).take(pos).collect();
                    if line.is_empty() {
                        continue;
                    }
                    if events
                        .send(SessionEvent::Line { conn_id, line })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }

    let _ = events.send(SessionEvent::Disconnected { conn_id }).await;
}

/// Writes queued frames to the socket in order. Ends when the registry drops
/// the outbound sender (connection closed) or the peer stops accepting
/// writes.
async fn write_loop(mut write_half: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = frames.recv().await {
        if write_half.write_all(frame.as_bytes()).await.is_err() {
            break;
        }
    }
}
