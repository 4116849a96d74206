// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Commands: validated, discrete mutations of the simulator.
//!
//! A command is checked in full by [`Command::validate`] before the service
//! touches the engine, so a rejected command never leaves a partial mutation
//! behind. Failures raised by the engine itself (full containers, missing
//! history) are mapped onto [`CommandErrorKind`] for callers that only need
//! the category.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use penguin_loop::{EngineError, EngineState, Priority, QueueError, Schedule, TaskSpec};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted task or snapshot name, in characters.
pub const MAX_NAME_LEN: usize = 128;

/// Largest accepted timer delay in milliseconds (signed 32-bit clamp used by
/// browser timers).
pub const MAX_TIMER_DELAY_MS: u64 = 2_147_483_647;

/// Deepest accepted follow-up nesting, counting the task itself.
pub const MAX_SCHEDULE_DEPTH: usize = 16;

/// A mutation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Command {
    /// Push a synchronous frame onto the call stack.
    PushFunction {
        /// Frame to push.
        task: TaskSpec,
    },
    /// Pop (and run) the top frame.
    PopFunction,
    /// Queue a microtask.
    EnqueueMicrotask {
        /// Microtask to queue.
        task: TaskSpec,
        /// Lane.
        #[serde(default)]
        priority: Priority,
    },
    /// Queue a macrotask.
    EnqueueMacrotask {
        /// Macrotask to queue.
        task: TaskSpec,
        /// Timer delay in milliseconds.
        #[serde(default)]
        delay: u64,
    },
    /// Advance the engine by one phase transition.
    Tick,
    /// Restore the state recorded at `tick`, discarding everything later.
    Rewind {
        /// Target tick.
        tick: u64,
    },
    /// Pause the run loop after `tick` commits.
    SetBreakpoint {
        /// Breakpoint tick.
        tick: u64,
    },
    /// Remove a breakpoint.
    ClearBreakpoint {
        /// Breakpoint tick.
        tick: u64,
    },
    /// Suspend the run loop.
    Pause,
    /// Resume a paused run loop.
    Resume,
    /// Let the run loop drive ticks.
    Start,
    /// Stop the run loop.
    Stop,
    /// Capture the current engine under `name`.
    CreateSnapshot {
        /// Snapshot name.
        name: String,
    },
    /// Replace the engine with the snapshot called `name`.
    RestoreSnapshot {
        /// Snapshot name.
        name: String,
    },
    /// Forget the snapshot called `name`.
    DeleteSnapshot {
        /// Snapshot name.
        name: String,
    },
    /// Back to tick 0; clears history and snapshots.
    Reset,
}

impl Command {
    /// Stable kebab-case tag, matching the serialized `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PushFunction { .. } => "push-function",
            Self::PopFunction => "pop-function",
            Self::EnqueueMicrotask { .. } => "enqueue-microtask",
            Self::EnqueueMacrotask { .. } => "enqueue-macrotask",
            Self::Tick => "tick",
            Self::Rewind { .. } => "rewind",
            Self::SetBreakpoint { .. } => "set-breakpoint",
            Self::ClearBreakpoint { .. } => "clear-breakpoint",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::CreateSnapshot { .. } => "create-snapshot",
            Self::RestoreSnapshot { .. } => "restore-snapshot",
            Self::DeleteSnapshot { .. } => "delete-snapshot",
            Self::Reset => "reset",
        }
    }

    /// Rejects malformed payloads. Never looks at engine state.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Self::PushFunction { task } | Self::EnqueueMicrotask { task, .. } => {
                validate_spec(task)
            }
            Self::EnqueueMacrotask { task, delay } => {
                validate_delay(*delay)?;
                validate_spec(task)
            }
            Self::CreateSnapshot { name }
            | Self::RestoreSnapshot { name }
            | Self::DeleteSnapshot { name } => validate_name("snapshot", name),
            Self::PopFunction
            | Self::Tick
            | Self::Rewind { .. }
            | Self::SetBreakpoint { .. }
            | Self::ClearBreakpoint { .. }
            | Self::Pause
            | Self::Resume
            | Self::Start
            | Self::Stop
            | Self::Reset => Ok(()),
        }
    }
}

fn validate_name(field: &'static str, name: &str) -> Result<(), CommandError> {
    if name.trim().is_empty() {
        return Err(CommandError::EmptyName { field });
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(CommandError::NameTooLong {
            field,
            len,
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

fn validate_delay(delay: u64) -> Result<(), CommandError> {
    if delay > MAX_TIMER_DELAY_MS {
        return Err(CommandError::DelayTooLarge {
            delay,
            max: MAX_TIMER_DELAY_MS,
        });
    }
    Ok(())
}

fn validate_spec(spec: &TaskSpec) -> Result<(), CommandError> {
    let depth = spec.depth();
    if depth > MAX_SCHEDULE_DEPTH {
        return Err(CommandError::NestingTooDeep {
            depth,
            max: MAX_SCHEDULE_DEPTH,
        });
    }
    validate_tree(spec)
}

fn validate_tree(spec: &TaskSpec) -> Result<(), CommandError> {
    validate_name("task", &spec.name)?;
    for schedule in &spec.schedules {
        if let Schedule::Macrotask { delay, .. } = schedule {
            validate_delay(*delay)?;
        }
        validate_tree(schedule.spec())?;
    }
    Ok(())
}

/// Who sent a command, and when.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Caller identifier, if any.
    #[serde(default)]
    pub caller: Option<String>,
}

impl CommandContext {
    /// Context stamped with the current wall-clock time.
    pub fn now(caller: Option<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        Self {
            timestamp_ms,
            caller,
        }
    }
}

/// Failure category reported in a [`CommandResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandErrorKind {
    /// Malformed payload; nothing was touched.
    Validation,
    /// A container was full.
    Capacity,
    /// Named snapshot or requested tick does not exist.
    NotFound,
    /// The command does not apply to the current state (e.g. popping an
    /// empty stack).
    InvalidState,
    /// The engine failed an internal check.
    Execution,
}

impl CommandErrorKind {
    /// Stable kebab-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Capacity => "capacity",
            Self::NotFound => "not-found",
            Self::InvalidState => "invalid-state",
            Self::Execution => "execution",
        }
    }
}

impl fmt::Display for CommandErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a command failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Name empty after trimming.
    #[error("{field} name must not be empty")]
    EmptyName {
        /// Which name.
        field: &'static str,
    },
    /// Name longer than [`MAX_NAME_LEN`].
    #[error("{field} name is {len} characters long (max {max})")]
    NameTooLong {
        /// Which name.
        field: &'static str,
        /// Actual length in characters.
        len: usize,
        /// Limit.
        max: usize,
    },
    /// Delay above [`MAX_TIMER_DELAY_MS`].
    #[error("delay {delay}ms exceeds {max}ms")]
    DelayTooLarge {
        /// Requested delay.
        delay: u64,
        /// Limit.
        max: u64,
    },
    /// Follow-ups nested deeper than [`MAX_SCHEDULE_DEPTH`].
    #[error("follow-ups nested {depth} deep (max {max})")]
    NestingTooDeep {
        /// Actual depth.
        depth: usize,
        /// Limit.
        max: usize,
    },
    /// No snapshot with that name.
    #[error("no snapshot named {name:?}")]
    UnknownSnapshot {
        /// Requested name.
        name: String,
    },
    /// The engine refused the operation.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl CommandError {
    /// Category of this failure.
    pub fn kind(&self) -> CommandErrorKind {
        match self {
            Self::EmptyName { .. }
            | Self::NameTooLong { .. }
            | Self::DelayTooLarge { .. }
            | Self::NestingTooDeep { .. } => CommandErrorKind::Validation,
            Self::UnknownSnapshot { .. } | Self::Engine(EngineError::HistoryUnavailable { .. }) => {
                CommandErrorKind::NotFound
            }
            Self::Engine(EngineError::Queue(err)) if err.is_capacity() => {
                CommandErrorKind::Capacity
            }
            Self::Engine(EngineError::Queue(QueueError::Empty { .. })) => {
                CommandErrorKind::InvalidState
            }
            Self::Engine(_) => CommandErrorKind::Execution,
        }
    }
}

/// Outcome of a dispatched command.
#[derive(Clone, Debug)]
pub struct CommandResult {
    /// Whether the command applied.
    pub success: bool,
    /// State after the command (present on success).
    pub state: Option<Arc<EngineState>>,
    /// Failure category (present on failure).
    pub error: Option<CommandErrorKind>,
    /// Human-readable outcome.
    pub message: String,
}

impl CommandResult {
    /// Successful result carrying the new state.
    pub fn ok(state: Arc<EngineState>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            state: Some(state),
            error: None,
            message: message.into(),
        }
    }

    /// Failed result describing `err`.
    pub fn failed(err: &CommandError) -> Self {
        Self {
            success: false,
            state: None,
            error: Some(err.kind()),
            message: err.to_string(),
        }
    }
}
