// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Tasks, frames and the schedules they carry.
//!
//! A [`Task`] is the atomic schedulable unit of the simulator. It lives in
//! exactly one container at a time (call stack, microtask queue or macrotask
//! queue) and moves between containers by value.
//!
//! Tasks are created from a [`TaskSpec`], which is the caller-facing payload:
//! a display name, where the work came from, and an ordered list of follow-up
//! [`Schedule`]s. When the engine executes a task, each schedule is
//! materialized into a fresh task and enqueued. This is how a promise callback
//! that queues another callback, or a `main` that calls `setTimeout`, is
//! expressed without running any user code.

use std::fmt;

/// Unique identifier for a task within one engine lifetime.
///
/// Ids are allocated from a counter that is part of the replayed engine state,
/// so replaying the same commands from `reset` yields the same ids.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskId(pub u64);

impl TaskId {
    /// Returns the raw counter value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which container family a task belongs to. Immutable after creation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TaskKind {
    /// A synchronous function call pushed directly onto the call stack.
    CallstackFrame,
    /// A job for the microtask queue (promise reactions, `queueMicrotask`).
    Microtask,
    /// A job for the macrotask queue (timers, I/O, events).
    Macrotask,
}

impl TaskKind {
    /// Stable kebab-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallstackFrame => "callstack-frame",
            Self::Microtask => "microtask",
            Self::Macrotask => "macrotask",
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::CallstackFrame => 0,
            Self::Microtask => 1,
            Self::Macrotask => 2,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Microtask lane selector.
///
/// Real JavaScript engines have no microtask priorities; the high lane is a
/// teaching device. High-priority microtasks drain before normal ones within
/// the same drain phase. The field is carried on every task but only consulted
/// by the microtask queue.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Priority {
    /// Regular FIFO lane.
    #[default]
    Normal,
    /// Drained ahead of the normal lane.
    High,
}

impl Priority {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::High => 1,
        }
    }
}

/// Where a piece of work originated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TaskSource {
    /// A plain synchronous call.
    #[default]
    SyncCall,
    /// A promise reaction (`then`/`catch`/`finally`, `await` continuation).
    Promise,
    /// An explicit `queueMicrotask` call.
    QueueMicrotask,
    /// `setTimeout`/`setInterval`.
    Timer,
    /// An I/O completion callback.
    Io,
    /// A DOM or user event handler.
    Event,
}

impl TaskSource {
    /// Stable kebab-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyncCall => "sync-call",
            Self::Promise => "promise",
            Self::QueueMicrotask => "queue-microtask",
            Self::Timer => "timer",
            Self::Io => "io",
            Self::Event => "event",
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::SyncCall => 0,
            Self::Promise => 1,
            Self::QueueMicrotask => 2,
            Self::Timer => 3,
            Self::Io => 4,
            Self::Event => 5,
        }
    }
}

impl fmt::Display for TaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A follow-up scheduled when the owning task executes.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "kebab-case"))]
pub enum Schedule {
    /// Enqueue a microtask.
    Microtask {
        /// Payload of the new microtask.
        task: TaskSpec,
        /// Lane the microtask is placed in.
        #[cfg_attr(feature = "serde", serde(default))]
        priority: Priority,
    },
    /// Enqueue a macrotask.
    Macrotask {
        /// Payload of the new macrotask.
        task: TaskSpec,
        /// Timer delay in milliseconds; orders the macrotask queue.
        #[cfg_attr(feature = "serde", serde(default))]
        delay: u64,
    },
}

impl Schedule {
    /// The payload this schedule will materialize.
    #[must_use]
    pub fn spec(&self) -> &TaskSpec {
        match self {
            Self::Microtask { task, .. } | Self::Macrotask { task, .. } => task,
        }
    }
}

/// Caller-facing description of a task, before an id is assigned.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskSpec {
    /// Display name (function name, callback label).
    pub name: String,
    /// Where the work came from.
    #[cfg_attr(feature = "serde", serde(default))]
    pub source: TaskSource,
    /// Optional free-form description shown in the UI.
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: Option<String>,
    /// Follow-ups enqueued when this task executes, in order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub schedules: Vec<Schedule>,
}

impl TaskSpec {
    /// A synchronous-call spec with no follow-ups.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the originating source.
    pub fn with_source(mut self, source: TaskSource) -> Self {
        self.source = source;
        self
    }

    /// Attaches a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a normal-priority microtask follow-up.
    pub fn then_microtask(self, task: TaskSpec) -> Self {
        self.then(Schedule::Microtask {
            task,
            priority: Priority::Normal,
        })
    }

    /// Appends a high-priority microtask follow-up.
    pub fn then_high_microtask(self, task: TaskSpec) -> Self {
        self.then(Schedule::Microtask {
            task,
            priority: Priority::High,
        })
    }

    /// Appends a macrotask follow-up with the given delay.
    pub fn then_macrotask(self, task: TaskSpec, delay: u64) -> Self {
        self.then(Schedule::Macrotask { task, delay })
    }

    /// Appends an arbitrary follow-up.
    pub fn then(mut self, schedule: Schedule) -> Self {
        self.schedules.push(schedule);
        self
    }

    /// Nesting depth of the follow-up tree (a spec with no follow-ups has depth 1).
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self
            .schedules
            .iter()
            .map(|s| s.spec().depth())
            .max()
            .unwrap_or(0)
    }
}

/// A scheduled unit of work with an assigned id.
///
/// Fields are private: kind, id and creation tick never change once the engine
/// has created the task.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    id: TaskId,
    name: String,
    kind: TaskKind,
    priority: Priority,
    source: TaskSource,
    delay: Option<u64>,
    description: Option<String>,
    created_tick: u64,
    schedules: Vec<Schedule>,
}

impl Task {
    fn from_spec(
        id: TaskId,
        spec: TaskSpec,
        kind: TaskKind,
        priority: Priority,
        delay: Option<u64>,
        tick: u64,
    ) -> Self {
        Self {
            id,
            name: spec.name,
            kind,
            priority,
            source: spec.source,
            delay,
            description: spec.description,
            created_tick: tick,
            schedules: spec.schedules,
        }
    }

    /// Creates a call-stack frame.
    pub fn frame(id: TaskId, spec: TaskSpec, tick: u64) -> Self {
        Self::from_spec(id, spec, TaskKind::CallstackFrame, Priority::Normal, None, tick)
    }

    /// Creates a microtask in the given lane.
    pub fn microtask(id: TaskId, spec: TaskSpec, priority: Priority, tick: u64) -> Self {
        Self::from_spec(id, spec, TaskKind::Microtask, priority, None, tick)
    }

    /// Creates a macrotask with the given timer delay.
    pub fn macrotask(id: TaskId, spec: TaskSpec, delay: u64, tick: u64) -> Self {
        Self::from_spec(id, spec, TaskKind::Macrotask, Priority::Normal, Some(delay), tick)
    }

    /// Task id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container family.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Microtask lane.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Originating source.
    pub fn source(&self) -> TaskSource {
        self.source
    }

    /// Timer delay (macrotasks only).
    pub fn delay(&self) -> Option<u64> {
        self.delay
    }

    /// Optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Tick at which the task was created (its enqueue tick).
    pub fn created_tick(&self) -> u64 {
        self.created_tick
    }

    /// Follow-ups materialized when this task executes.
    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }
}
