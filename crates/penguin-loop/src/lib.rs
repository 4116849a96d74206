// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! penguin-loop: deterministic JavaScript event-loop simulator.
//!
//! The engine models the call stack, the microtask queue and the macrotask
//! queue as plain data and advances them one phase transition per tick.
//! Every tick is recorded, so any earlier tick can be restored exactly.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod engine;
mod event;
mod history;
mod listener;
mod queue;
mod state;
mod task;

/// Engine, its errors, captures and timing counters.
pub use engine::{EngineCapture, EngineError, EventLoopEngine, TickTimings};
/// Execution event log.
pub use event::{EventKind, EventLog, ExecutionEvent};
/// Tick history and retention.
pub use history::{ExecutionHistory, HistoryEntry, RetentionPolicy};
/// Listener registry with unsubscribe handles.
pub use listener::{ListenerRegistry, Unsubscribe};
/// Task containers and capacity limits.
pub use queue::{
    CallStack, EngineLimits, MacrotaskKey, MacrotaskQueue, MicrotaskQueue, QueueDebugInfo,
    QueueError, QueueName, QueueSystem, StackTraceFrame, DEFAULT_MAX_CALL_STACK_SIZE,
    DEFAULT_MAX_MACROTASK_QUEUE_SIZE, DEFAULT_MAX_MICROTASK_QUEUE_SIZE,
};
/// Engine state, phases and digests.
pub use state::{EngineState, Hash, Phase, Statistics};
/// Tasks and their schedules.
pub use task::{Priority, Schedule, Task, TaskId, TaskKind, TaskSource, TaskSpec};
