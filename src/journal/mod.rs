//! Durable Command Log Module
//!
//! This module provides the append-only command journal (`info.dat`) and the
//! recovery driver that replays it at startup. The journal is the sole
//! persistence mechanism: one compact JSON object per line, LF-terminated,
//! containing exactly the four mutation commands in the order they were
//! accepted.
//!
//! Journal lines store the accepted command as the client sent it, so
//! server-assigned ids are never persisted - replaying the same command
//! sequence through the entity store regenerates them deterministically.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::engine::EngineStore;
use crate::protocol;

/// Append-only journal of accepted mutation commands.
///
/// Each append is self-contained: the file is opened in append mode, the
/// line is written and flushed, and the handle is closed again. An append
/// failure is logged and swallowed - the in-memory mutation has already
/// happened and the client still gets its reply. This best-effort durability
/// is part of the contract; there is no fsync-before-reply upgrade.
#[derive(Debug, Clone)]
pub struct CommandJournal {
    path: PathBuf,
}

impl CommandJournal {
    /// Creates a journal handle for the given path. The file itself is
    /// created lazily on the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one accepted mutation command, compact-encoded plus a
    /// terminating LF.
    pub fn append(&self, command: &Value) {
        let line = command.to_string();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                writeln!(file, "{}", line)?;
                file.flush()
            });

        if let Err(err) = result {
            warn!("failed to save command: {} ({})", line, err);
        }
    }

    /// Replays the journal into the store.
    ///
    /// Runs before the listener binds. Every line is decoded with the same
    /// command decoder the dispatcher uses and applied through the same
    /// entity store primitives, with no replies, no broadcasts and no
    /// re-appending. Undecodable lines are skipped and logged. A missing or
    /// unreadable file is not fatal: the server starts empty.
    ///
    /// # Returns
    ///
    /// The number of commands applied.
    pub fn replay(&self, store: &mut EngineStore) -> usize {
        info!("Initialization ...");

        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(_) => {
                info!("Load engine data failed");
                return 0;
            }
        };

        let mut applied = 0;
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("stopped reading journal: {}", err);
                    break;
                }
            };
            if line.is_empty() {
                continue;
            }
            match protocol::decode_line(line.as_bytes()) {
                Ok((_, command)) => {
                    store.apply_mutation(&command);
                    applied += 1;
                }
                Err(err) => {
                    warn!("skipping journal line: {} ({:#})", line, err);
                }
            }
        }

        info!("Load engine data success");
        applied
    }
}
