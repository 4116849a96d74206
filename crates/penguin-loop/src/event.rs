// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Ordered log of what the engine did, tick by tick.
//!
//! Every history entry records the log length at the moment it was committed,
//! so rewinding to a tick truncates the log back to exactly what had happened
//! by then.

use std::fmt;

use crate::task::TaskId;

/// Classification of an [`ExecutionEvent`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum EventKind {
    /// A frame was pushed onto the call stack.
    CallStackPush,
    /// A frame was popped by an explicit pop.
    CallStackPop,
    /// A call-stack frame ran to completion.
    FrameExecuted,
    /// A microtask entered the queue.
    MicrotaskEnqueued,
    /// A microtask ran during a drain.
    MicrotaskExecuted,
    /// A macrotask entered the queue.
    MacrotaskEnqueued,
    /// A macrotask was moved onto the call stack.
    MacrotaskPicked,
    /// The engine changed phase.
    PhaseChanged,
    /// A container refused a task because it was full.
    CapacityExceeded,
    /// The engine reached `completed`.
    Completed,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::CallStackPush,
        Self::CallStackPop,
        Self::FrameExecuted,
        Self::MicrotaskEnqueued,
        Self::MicrotaskExecuted,
        Self::MacrotaskEnqueued,
        Self::MacrotaskPicked,
        Self::PhaseChanged,
        Self::CapacityExceeded,
        Self::Completed,
    ];

    /// Stable kebab-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallStackPush => "call-stack-push",
            Self::CallStackPop => "call-stack-pop",
            Self::FrameExecuted => "frame-executed",
            Self::MicrotaskEnqueued => "microtask-enqueued",
            Self::MicrotaskExecuted => "microtask-executed",
            Self::MacrotaskEnqueued => "macrotask-enqueued",
            Self::MacrotaskPicked => "macrotask-picked",
            Self::PhaseChanged => "phase-changed",
            Self::CapacityExceeded => "capacity-exceeded",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged engine event.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExecutionEvent {
    /// Position in the log (0-based).
    pub seq: u64,
    /// Tick during which the event happened. Events between ticks carry the
    /// last committed tick.
    pub tick: u64,
    /// Classification.
    pub kind: EventKind,
    /// Task involved, if any.
    pub task: Option<TaskId>,
    /// Human-readable detail (task name, phase transition, error text).
    pub detail: String,
}

/// Append-only (except for rewind truncation) event log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<ExecutionEvent>,
}

impl EventLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(
        &mut self,
        tick: u64,
        kind: EventKind,
        task: Option<TaskId>,
        detail: impl Into<String>,
    ) {
        let seq = self.events.len() as u64;
        self.events.push(ExecutionEvent {
            seq,
            tick,
            kind,
            task,
            detail: detail.into(),
        });
    }

    /// Drops every event at or beyond `len`.
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in order.
    pub fn as_slice(&self) -> &[ExecutionEvent] {
        &self.events
    }

    /// Events of a single kind, in order.
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &ExecutionEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}
