// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Event-loop engine: the phase state machine over the queue system.
//!
//! Each [`EventLoopEngine::tick`] performs exactly one transition:
//!
//! | From | Condition | Effect | To |
//! | --- | --- | --- | --- |
//! | `idle` | frames on the stack | none | `executing` |
//! | `idle` | stack empty | none | `microtask-drain` |
//! | `executing` | always | unwind every frame, top first | `microtask-drain` |
//! | `microtask-drain` | microtasks pending | drain to exhaustion | `microtask-drain` |
//! | `microtask-drain` | queue empty | none | `macrotask-pick` |
//! | `macrotask-pick` | macrotask pending | move earliest onto the stack | `executing` |
//! | `macrotask-pick` | nothing pending anywhere | clear run flag | `completed` |
//! | `completed` | always | no-op, nothing recorded | `completed` |
//!
//! Executing a task materializes its follow-up schedules. Microtasks created
//! during a drain join the same drain. A follow-up that does not fit is
//! dropped, counted in `stats.error_count` and logged as
//! `capacity-exceeded`; the tick still commits.
//!
//! Invariants
//! - ENG-001: `history.get(n)` is the state as of tick `n`: the committed
//!   tick plus any push, pop or enqueue made before tick `n + 1`. Replaying
//!   ticks from a rewound entry therefore reproduces the original run.
//! - ENG-002: a tick never commits more than one transition.
//! - ENG-003: a failed push/enqueue leaves the state untouched, including the
//!   task-id counter.
//! - ENG-004: a failed tick leaves no trace: state, event log and history are
//!   exactly as before the call.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::event::{EventKind, EventLog};
use crate::history::{ExecutionHistory, HistoryEntry, RetentionPolicy};
use crate::listener::{ListenerRegistry, Unsubscribe};
use crate::queue::{EngineLimits, QueueError};
use crate::state::{EngineState, Phase};
use crate::task::{Priority, Schedule, Task, TaskId, TaskKind, TaskSpec};

/// Errors emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A container refused the operation.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The requested tick is not in the retained history.
    #[error("history unavailable for tick {tick}")]
    HistoryUnavailable {
        /// Requested tick.
        tick: u64,
    },
    /// A history entry no longer matches its recorded digest.
    #[error("history corrupted at tick {tick}: state digest mismatch")]
    HistoryCorrupted {
        /// Tick whose entry failed verification.
        tick: u64,
    },
    /// Internal invariant violated (engine state corruption).
    #[error("internal invariant violated: {0}")]
    InternalCorruption(&'static str),
}

/// Wall-clock tick durations. Not part of the replayed state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickTimings {
    /// Ticks measured.
    pub count: u64,
    /// Sum of measured durations.
    pub total: Duration,
    /// Longest single tick.
    pub max: Duration,
    /// Most recent tick.
    pub last: Option<Duration>,
}

impl TickTimings {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
        self.last = Some(elapsed);
    }

    /// Mean tick duration, or zero before the first tick.
    pub fn average(&self) -> Duration {
        u32::try_from(self.count)
            .ok()
            .filter(|&n| n > 0)
            .map_or(Duration::ZERO, |n| self.total / n)
    }
}

/// Everything needed to put an engine back exactly where it was.
#[derive(Clone, Debug)]
pub struct EngineCapture {
    /// Engine state at capture time.
    pub state: EngineState,
    /// History at capture time (entries are shared, not copied).
    pub history: ExecutionHistory,
    /// Event log at capture time.
    pub events: EventLog,
}

/// Deterministic, steppable and rewindable event-loop engine.
///
/// The engine owns the queue system, the tick history and the event log. It
/// is driven by explicit calls; no timers live here.
#[derive(Debug)]
pub struct EventLoopEngine {
    state: EngineState,
    limits: EngineLimits,
    history: ExecutionHistory,
    events: EventLog,
    timings: TickTimings,
    listeners: ListenerRegistry<EngineState>,
    ticking: bool,
}

impl EventLoopEngine {
    /// Engine with the given capacity limits, keeping all history.
    pub fn new(limits: EngineLimits) -> Self {
        Self::with_retention(limits, RetentionPolicy::KeepAll)
    }

    /// Engine with an explicit history retention policy.
    pub fn with_retention(limits: EngineLimits, retention: RetentionPolicy) -> Self {
        let mut engine = Self {
            state: EngineState::initial(limits),
            limits,
            history: ExecutionHistory::new(retention),
            events: EventLog::new(),
            timings: TickTimings::default(),
            listeners: ListenerRegistry::new(),
            ticking: false,
        };
        engine.reset();
        engine
    }

    /// Discards all state, history and events; records tick 0.
    ///
    /// Tick listeners stay registered.
    pub fn reset(&mut self) {
        self.state = EngineState::initial(self.limits);
        self.history.clear();
        self.events.clear();
        self.timings = TickTimings::default();
        self.commit_history();
        debug!("engine reset");
    }

    /// Current state.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Configured limits.
    pub fn limits(&self) -> EngineLimits {
        self.limits
    }

    /// Retained history.
    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Wall-clock tick measurements.
    pub fn timings(&self) -> TickTimings {
        self.timings
    }

    /// Copy of the retained history in tick order.
    pub fn execution_history(&self) -> Vec<std::sync::Arc<HistoryEntry>> {
        self.history.entries()
    }

    /// Registers a listener invoked after every committed tick.
    pub fn on_tick<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&EngineState) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    // ── Queue operations ────────────────────────────────────────────────

    /// Pushes a synchronous frame onto the call stack.
    pub fn push_call_stack(&mut self, spec: TaskSpec) -> Result<TaskId, EngineError> {
        let id = self.state.peek_task_id();
        let frame = Task::frame(id, spec, self.state.tick);
        let name = frame.name().to_owned();
        let depth = self.state.queues.push_call_stack(frame)?;
        self.after_insert(id, depth, EventKind::CallStackPush, name);
        Ok(id)
    }

    /// Pops the top frame, executing it (its follow-ups are enqueued).
    pub fn pop_call_stack(&mut self) -> Result<Task, EngineError> {
        let frame = self.state.queues.pop_call_stack()?;
        self.events.record(
            self.state.tick,
            EventKind::CallStackPop,
            Some(frame.id()),
            frame.name(),
        );
        self.execute(&frame);
        self.refresh_history();
        Ok(frame)
    }

    /// Enqueues a microtask.
    pub fn enqueue_microtask(
        &mut self,
        spec: TaskSpec,
        priority: Priority,
    ) -> Result<TaskId, EngineError> {
        let id = self.state.peek_task_id();
        let task = Task::microtask(id, spec, priority, self.state.tick);
        let name = task.name().to_owned();
        let len = self.state.queues.enqueue_microtask(task)?;
        self.after_insert(id, len, EventKind::MicrotaskEnqueued, name);
        Ok(id)
    }

    /// Enqueues a macrotask with the given timer delay.
    pub fn enqueue_macrotask(&mut self, spec: TaskSpec, delay: u64) -> Result<TaskId, EngineError> {
        let id = self.state.peek_task_id();
        let task = Task::macrotask(id, spec, delay, self.state.tick);
        let name = task.name().to_owned();
        let len = self.state.queues.enqueue_macrotask(task)?;
        self.after_insert(id, len, EventKind::MacrotaskEnqueued, name);
        Ok(id)
    }

    fn after_insert(&mut self, id: TaskId, len: usize, kind: EventKind, name: String) {
        self.state.next_task_id += 1;
        if kind == EventKind::CallStackPush {
            self.state.stats.max_call_stack_depth = self.state.stats.max_call_stack_depth.max(len);
        }
        self.events.record(self.state.tick, kind, Some(id), name);
        if self.state.phase == Phase::Completed {
            self.set_phase(Phase::Idle);
        }
        if !self.ticking {
            self.refresh_history();
        }
    }

    // ── Control plane ───────────────────────────────────────────────────

    /// Adds a breakpoint. Returns `false` if it was already set.
    pub fn set_breakpoint(&mut self, tick: u64) -> bool {
        self.state.breakpoints.insert(tick)
    }

    /// Removes a breakpoint. Returns `false` if it was not set.
    pub fn clear_breakpoint(&mut self, tick: u64) -> bool {
        self.state.breakpoints.remove(&tick)
    }

    /// True when the current tick is a breakpoint.
    pub fn at_breakpoint(&self) -> bool {
        self.state.breakpoints.contains(&self.state.tick)
    }

    /// Sets the paused flag.
    pub fn set_paused(&mut self, paused: bool) {
        self.state.is_paused = paused;
    }

    /// Sets the running flag.
    pub fn set_running(&mut self, running: bool) {
        self.state.is_running = running;
    }

    // ── Ticking ─────────────────────────────────────────────────────────

    /// Performs one phase transition and records it.
    ///
    /// On `completed` this is a no-op that returns the terminal state.
    pub fn tick(&mut self) -> Result<&EngineState, EngineError> {
        if self.state.phase == Phase::Completed {
            return Ok(&self.state);
        }
        let started = Instant::now();
        self.transact(|engine| {
            engine.state.tick += 1;
            engine.advance()
        })?;
        self.commit_history();
        self.timings.record(started.elapsed());
        debug!(
            tick = self.state.tick,
            phase = %self.state.phase,
            stack = self.state.queues.call_stack.len(),
            microtasks = self.state.queues.microtasks.len(),
            macrotasks = self.state.queues.macrotasks.len(),
            "tick committed"
        );
        self.listeners.notify(&self.state);
        Ok(&self.state)
    }

    /// Runs one tick body against the live state. On error the state and the
    /// event log are put back as they were, so nothing of the tick remains.
    fn transact<F>(&mut self, body: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut Self) -> Result<(), EngineError>,
    {
        let before = self.state.clone();
        let cursor = self.events.len();
        self.ticking = true;
        let result = body(self);
        self.ticking = false;
        if let Err(err) = &result {
            warn!(tick = before.tick + 1, %err, "tick rolled back");
            self.state = before;
            self.events.truncate(cursor);
        }
        result
    }

    fn advance(&mut self) -> Result<(), EngineError> {
        match self.state.phase {
            Phase::Idle => {
                if self.state.queues.call_stack.is_empty() {
                    self.set_phase(Phase::MicrotaskDrain);
                } else {
                    self.set_phase(Phase::Executing);
                }
            }
            Phase::Executing => {
                while let Ok(frame) = self.state.queues.pop_call_stack() {
                    self.execute(&frame);
                }
                self.set_phase(Phase::MicrotaskDrain);
            }
            Phase::MicrotaskDrain => {
                if self.state.queues.microtasks.is_empty() {
                    self.set_phase(Phase::MacrotaskPick);
                } else {
                    while let Ok(task) = self.state.queues.dequeue_microtask() {
                        self.execute(&task);
                    }
                }
            }
            Phase::MacrotaskPick => self.pick_macrotask()?,
            Phase::Completed => {
                return Err(EngineError::InternalCorruption(
                    "advance called on a completed engine",
                ))
            }
        }
        Ok(())
    }

    fn pick_macrotask(&mut self) -> Result<(), EngineError> {
        let queues = &self.state.queues;
        if !queues.macrotasks.is_empty() {
            if queues.call_stack.is_full() {
                let capacity = queues.call_stack.capacity();
                self.capacity_failure(None, &QueueError::CallStackOverflow { capacity });
                self.set_phase(Phase::Executing);
                return Ok(());
            }
            let task = self.state.queues.dequeue_macrotask()?;
            self.events.record(
                self.state.tick,
                EventKind::MacrotaskPicked,
                Some(task.id()),
                task.name(),
            );
            let depth = self.state.queues.push_call_stack(task)?;
            self.state.stats.max_call_stack_depth = self.state.stats.max_call_stack_depth.max(depth);
            self.set_phase(Phase::Executing);
        } else if !queues.call_stack.is_empty() {
            self.set_phase(Phase::Executing);
        } else if !queues.microtasks.is_empty() {
            self.set_phase(Phase::MicrotaskDrain);
        } else {
            self.set_phase(Phase::Completed);
            self.state.is_running = false;
            self.events
                .record(self.state.tick, EventKind::Completed, None, "all queues empty");
        }
        Ok(())
    }

    fn execute(&mut self, task: &Task) {
        self.state.stats.total_executed += 1;
        let kind = match task.kind() {
            TaskKind::Microtask => EventKind::MicrotaskExecuted,
            TaskKind::CallstackFrame | TaskKind::Macrotask => EventKind::FrameExecuted,
        };
        self.events
            .record(self.state.tick, kind, Some(task.id()), task.name());
        for schedule in task.schedules() {
            self.materialize(schedule.clone(), task.id());
        }
    }

    fn materialize(&mut self, schedule: Schedule, parent: TaskId) {
        let outcome = match schedule {
            Schedule::Microtask { task, priority } => self.enqueue_microtask(task, priority),
            Schedule::Macrotask { task, delay } => self.enqueue_macrotask(task, delay),
        };
        if let Err(EngineError::Queue(err)) = outcome {
            self.capacity_failure(Some(parent), &err);
        }
    }

    fn capacity_failure(&mut self, task: Option<TaskId>, err: &QueueError) {
        self.state.stats.error_count += 1;
        warn!(tick = self.state.tick, %err, "follow-up dropped");
        self.events.record(
            self.state.tick,
            EventKind::CapacityExceeded,
            task,
            err.to_string(),
        );
    }

    fn set_phase(&mut self, next: Phase) {
        let prev = self.state.phase;
        if prev == next {
            return;
        }
        self.state.phase = next;
        self.events.record(
            self.state.tick,
            EventKind::PhaseChanged,
            None,
            format!("{prev} -> {next}"),
        );
    }

    fn commit_history(&mut self) {
        self.history
            .push(HistoryEntry::record(self.state.clone(), self.events.len()));
    }

    fn refresh_history(&mut self) {
        self.history
            .replace_last(HistoryEntry::record(self.state.clone(), self.events.len()));
    }

    // ── Time travel ─────────────────────────────────────────────────────

    /// Restores the state recorded at `tick` and truncates everything after it.
    ///
    /// Breakpoints and the paused flag are kept as they are now; the running
    /// flag is cleared.
    pub fn rewind_to_tick(&mut self, tick: u64) -> Result<&EngineState, EngineError> {
        let entry = self
            .history
            .get(tick)
            .cloned()
            .ok_or(EngineError::HistoryUnavailable { tick })?;
        if !entry.verify() {
            return Err(EngineError::HistoryCorrupted { tick });
        }
        let breakpoints = std::mem::take(&mut self.state.breakpoints);
        let paused = self.state.is_paused;
        self.state = entry.state.clone();
        self.state.breakpoints = breakpoints;
        self.state.is_paused = paused;
        self.state.is_running = false;
        self.history.truncate_after(tick);
        self.events.truncate(entry.event_cursor);
        debug!(tick, "rewound");
        Ok(&self.state)
    }

    /// Captures state, history and events.
    pub fn capture(&self) -> EngineCapture {
        EngineCapture {
            state: self.state.clone(),
            history: self.history.clone(),
            events: self.events.clone(),
        }
    }

    /// Replaces state, history and events with a capture.
    ///
    /// The running flag is cleared; everything else comes from the capture.
    pub fn restore(&mut self, capture: EngineCapture) {
        self.state = capture.state;
        self.state.is_running = false;
        self.history = capture.history;
        self.events = capture.events;
        debug!(tick = self.state.tick, "restored capture");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EventLoopEngine {
        EventLoopEngine::new(EngineLimits::default())
    }

    #[test]
    fn failed_tick_body_is_rolled_back() {
        let mut e = engine();
        e.push_call_stack(TaskSpec::new("main")).unwrap();
        let before = e.state().clone();
        let events = e.events().len();

        let result = e.transact(|engine| {
            engine.state.tick += 1;
            engine.advance()?;
            Err(EngineError::InternalCorruption("injected"))
        });
        assert_eq!(result, Err(EngineError::InternalCorruption("injected")));
        assert_eq!(e.state(), &before);
        assert_eq!(e.events().len(), events);
        assert_eq!(e.history().last_tick(), Some(0));

        let state = e.tick().unwrap();
        assert_eq!((state.tick, state.phase), (1, Phase::Executing));
    }

    #[test]
    fn reset_records_tick_zero() {
        let e = engine();
        assert_eq!(e.state().tick, 0);
        assert_eq!(e.state().phase, Phase::Idle);
        assert_eq!(e.history().len(), 1);
        assert_eq!(e.history().get(0).map(|h| h.tick), Some(0));
    }

    #[test]
    fn failed_push_does_not_consume_an_id() {
        let mut e = EventLoopEngine::new(EngineLimits {
            max_call_stack_size: 1,
            ..EngineLimits::default()
        });
        let first = e.push_call_stack(TaskSpec::new("a")).unwrap();
        let before = e.state().clone();
        let err = e.push_call_stack(TaskSpec::new("b")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Queue(QueueError::CallStackOverflow { capacity: 1 })
        ));
        assert_eq!(e.state(), &before);
        let _ = e.pop_call_stack().unwrap();
        let second = e.push_call_stack(TaskSpec::new("c")).unwrap();
        assert_eq!(second.value(), first.value() + 1);
    }

    #[test]
    fn completed_tick_is_noop() {
        let mut e = engine();
        while e.state().phase != Phase::Completed {
            e.tick().unwrap();
        }
        let tick = e.state().tick;
        let len = e.history().len();
        e.tick().unwrap();
        assert_eq!(e.state().tick, tick);
        assert_eq!(e.history().len(), len);
    }

    #[test]
    fn enqueue_after_completion_reopens_engine() {
        let mut e = engine();
        while e.state().phase != Phase::Completed {
            e.tick().unwrap();
        }
        e.enqueue_macrotask(TaskSpec::new("late"), 0).unwrap();
        assert_eq!(e.state().phase, Phase::Idle);
    }

    #[test]
    fn overflowing_follow_ups_count_as_errors() {
        let mut e = EventLoopEngine::new(EngineLimits {
            max_microtask_queue_size: 1,
            ..EngineLimits::default()
        });
        e.push_call_stack(
            TaskSpec::new("main")
                .then_microtask(TaskSpec::new("a"))
                .then_microtask(TaskSpec::new("b")),
        )
        .unwrap();
        e.tick().unwrap(); // idle -> executing
        e.tick().unwrap(); // unwind
        assert_eq!(e.state().queues.microtasks.len(), 1);
        assert_eq!(e.state().stats.error_count, 1);
        assert_eq!(e.events().of_kind(EventKind::CapacityExceeded).count(), 1);
    }

    #[test]
    fn between_tick_mutations_land_in_the_head_entry() {
        let mut e = engine();
        e.tick().unwrap();
        e.enqueue_macrotask(TaskSpec::new("later"), 3).unwrap();
        e.tick().unwrap();
        e.rewind_to_tick(1).unwrap();
        assert_eq!(e.state().queues.macrotasks.len(), 1);
        assert!(e.history().get(1).is_some_and(|h| h.verify()));
    }

    #[test]
    fn timings_accumulate_per_tick() {
        let mut e = engine();
        e.tick().unwrap();
        e.tick().unwrap();
        assert_eq!(e.timings().count, 2);
        assert!(e.timings().last.is_some());
    }
}
