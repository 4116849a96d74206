// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Bounded audit log of dispatched commands.
//!
//! Every dispatched command is recorded, applied or not. Recording can never
//! fail the command: a payload that does not serialize is stored as `null`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::command::{Command, CommandContext, CommandErrorKind, CommandResult};

/// Default number of retained log entries.
pub const DEFAULT_COMMAND_LOG_CAPACITY: usize = 1000;

/// One audited command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandLogEntry {
    /// Position in the log since the service was created.
    pub seq: u64,
    /// Command tag.
    pub kind: String,
    /// Full command as JSON.
    pub payload: Value,
    /// Whether the command applied.
    pub success: bool,
    /// Failure category, if any.
    pub error: Option<CommandErrorKind>,
    /// Result message.
    pub message: String,
    /// Engine tick after the command.
    pub tick: u64,
    /// Dispatch time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Caller, if known.
    pub caller: Option<String>,
}

/// Ring buffer of [`CommandLogEntry`] values; the oldest entry is evicted
/// once `capacity` is reached.
#[derive(Clone, Debug)]
pub struct CommandLogger {
    entries: VecDeque<CommandLogEntry>,
    capacity: usize,
    next_seq: u64,
}

impl Default for CommandLogger {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_LOG_CAPACITY)
    }
}

impl CommandLogger {
    /// Logger retaining at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Appends an entry for `command`.
    pub fn record(
        &mut self,
        command: &Command,
        ctx: &CommandContext,
        result: &CommandResult,
        tick: u64,
    ) {
        let payload = serde_json::to_value(command).unwrap_or_else(|err| {
            warn!(%err, kind = command.kind(), "command payload not serializable");
            Value::Null
        });
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CommandLogEntry {
            seq: self.next_seq,
            kind: command.kind().to_owned(),
            payload,
            success: result.success,
            error: result.error,
            message: result.message.clone(),
            tick,
            timestamp_ms: ctx.timestamp_ms,
            caller: ctx.caller.clone(),
        });
        self.next_seq += 1;
    }

    /// Up to `n` most recent entries, oldest first.
    pub fn latest(&self, n: usize) -> Vec<CommandLogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been recorded (or everything was evicted).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
