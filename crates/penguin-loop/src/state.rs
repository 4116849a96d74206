// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Engine state and its canonical digest.
//!
//! Determinism contract
//! - The state digest is a BLAKE3 hash over a canonical byte stream of the
//!   replayed state: tick, phase, task-id counter, statistics and the three
//!   containers in their observable order.
//! - Control-plane fields (`is_running`, `is_paused`, `breakpoints`) are not
//!   hashed. They steer the run loop but do not affect what a tick computes.
//! - Integers are 8-byte little-endian. Strings and lists are length-prefixed
//!   (8-byte little-endian). Options carry a 1-byte presence tag.
//!   Changing any of this changes every recorded digest.

use std::collections::BTreeSet;
use std::fmt;

use blake3::Hasher;

use crate::queue::{EngineLimits, QueueSystem};
use crate::task::{Schedule, Task, TaskId};

/// 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Position in the event-loop cycle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Phase {
    /// Freshly reset, or re-opened after completion.
    #[default]
    Idle,
    /// Frames are on the call stack and will unwind on the next tick.
    Executing,
    /// Draining microtasks to exhaustion.
    MicrotaskDrain,
    /// Choosing the next macrotask.
    MacrotaskPick,
    /// Nothing left to do.
    Completed,
}

impl Phase {
    /// Stable kebab-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Executing => "executing",
            Self::MicrotaskDrain => "microtask-drain",
            Self::MacrotaskPick => "macrotask-pick",
            Self::Completed => "completed",
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Executing => 1,
            Self::MicrotaskDrain => 2,
            Self::MacrotaskPick => 3,
            Self::Completed => 4,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic counters carried in the replayed state.
///
/// Wall-clock timings live in [`crate::TickTimings`], outside the state.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statistics {
    /// Frames and microtasks run to completion.
    pub total_executed: u64,
    /// Capacity failures hit while a tick materialized follow-ups.
    pub error_count: u64,
    /// Deepest call stack observed.
    pub max_call_stack_depth: usize,
}

/// Aggregate engine state. One of these is recorded per tick.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineState {
    /// Monotonic tick counter; 0 at reset.
    pub tick: u64,
    /// Current phase.
    pub phase: Phase,
    /// The three containers.
    pub queues: QueueSystem,
    /// Whether a run loop is driving ticks.
    pub is_running: bool,
    /// Whether the run loop is suspended.
    pub is_paused: bool,
    /// Tick indices at which the run loop pauses.
    pub breakpoints: BTreeSet<u64>,
    /// Counters.
    pub stats: Statistics,
    /// Next task id to hand out.
    pub next_task_id: u64,
}

impl EngineState {
    /// State at `reset`.
    #[must_use]
    pub fn initial(limits: EngineLimits) -> Self {
        Self {
            tick: 0,
            phase: Phase::Idle,
            queues: QueueSystem::new(limits),
            is_running: false,
            is_paused: false,
            breakpoints: BTreeSet::new(),
            stats: Statistics::default(),
            next_task_id: 1,
        }
    }

    /// Id the next created task will receive.
    pub fn peek_task_id(&self) -> TaskId {
        TaskId(self.next_task_id)
    }

    /// Canonical digest of the replayed portion of this state.
    #[must_use]
    pub fn digest(&self) -> Hash {
        let mut w = DigestWriter::new();
        w.u64(self.tick);
        w.u8(self.phase.tag());
        w.u64(self.next_task_id);
        w.u64(self.stats.total_executed);
        w.u64(self.stats.error_count);
        w.len(self.stats.max_call_stack_depth);

        let stack = &self.queues.call_stack;
        w.len(stack.capacity());
        w.len(stack.len());
        for task in stack.iter() {
            w.task(task);
        }

        let micro = &self.queues.microtasks;
        w.len(micro.capacity());
        w.len(micro.high_len());
        w.len(micro.normal_len());
        for task in micro.iter() {
            w.task(task);
        }

        let macro_q = &self.queues.macrotasks;
        w.len(macro_q.capacity());
        w.u64(macro_q.next_seq());
        w.len(macro_q.len());
        for (key, task) in macro_q.iter() {
            w.u64(key.delay);
            w.u64(key.enqueued_tick);
            w.u64(key.seq);
            w.task(task);
        }
        w.finish()
    }

    /// Lowercase hex of [`Self::digest`].
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }
}

struct DigestWriter {
    hasher: Hasher,
}

impl DigestWriter {
    fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    fn u8(&mut self, v: u8) {
        self.hasher.update(&[v]);
    }

    fn u64(&mut self, v: u64) {
        self.hasher.update(&v.to_le_bytes());
    }

    fn len(&mut self, v: usize) {
        self.u64(v as u64);
    }

    fn str(&mut self, s: &str) {
        self.len(s.len());
        self.hasher.update(s.as_bytes());
    }

    fn opt_u64(&mut self, v: Option<u64>) {
        match v {
            Some(v) => {
                self.u8(1);
                self.u64(v);
            }
            None => self.u8(0),
        }
    }

    fn opt_str(&mut self, v: Option<&str>) {
        match v {
            Some(s) => {
                self.u8(1);
                self.str(s);
            }
            None => self.u8(0),
        }
    }

    fn task(&mut self, task: &Task) {
        self.u64(task.id().value());
        self.u8(task.kind().tag());
        self.u8(task.priority().tag());
        self.u8(task.source().tag());
        self.opt_u64(task.delay());
        self.u64(task.created_tick());
        self.str(task.name());
        self.opt_str(task.description());
        self.schedules(task.schedules());
    }

    fn schedules(&mut self, schedules: &[Schedule]) {
        self.len(schedules.len());
        for schedule in schedules {
            match schedule {
                Schedule::Microtask { task, priority } => {
                    self.u8(0);
                    self.u8(priority.tag());
                    self.spec(task);
                }
                Schedule::Macrotask { task, delay } => {
                    self.u8(1);
                    self.u64(*delay);
                    self.spec(task);
                }
            }
        }
    }

    fn spec(&mut self, spec: &crate::task::TaskSpec) {
        self.str(&spec.name);
        self.u8(spec.source.tag());
        self.opt_str(spec.description.as_deref());
        self.schedules(&spec.schedules);
    }

    fn finish(self) -> Hash {
        self.hasher.finalize().into()
    }
}
