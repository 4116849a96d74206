// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Service façade: the single entry point for commands, queries and
//! subscriptions.
//!
//! The service owns one engine, the snapshot store, the command log and the
//! query cache. It is plain data with a single logical writer; the async run
//! loop shares it behind `Arc<tokio::sync::Mutex<_>>` (see [`crate::runner`]).
//!
//! Publishing
//! - After every successful command and every run-loop tick the service clones
//!   the engine state once into an `Arc` and hands that same `Arc` to the
//!   subscribers and the `on_state_change` callback.
//! - Publishing invalidates the query cache, so run-flag changes that keep
//!   the tick (auto-stop, breakpoint pause) are never answered from it.
//! - Failed commands publish nothing; they are still logged.

use std::sync::Arc;

use penguin_loop::{
    EngineState, EventLoopEngine, ListenerRegistry, Phase, RetentionPolicy, Unsubscribe,
};
use tracing::{debug, error, warn};

use crate::cache::{CacheKey, CacheStats, QueryCache};
use crate::command::{Command, CommandContext, CommandError, CommandErrorKind, CommandResult};
use crate::config::ServiceConfig;
use crate::logger::CommandLogger;
use crate::query::{execute, Query, QueryContext, QueryError, QueryResult};
use crate::runner::RunError;
use crate::snapshots::SnapshotStore;

/// What a single run-loop step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// A tick committed; keep going.
    Ticked {
        /// Committed tick.
        tick: u64,
    },
    /// A tick committed on a breakpoint; the engine is now paused.
    Breakpoint {
        /// Committed tick.
        tick: u64,
    },
    /// A tick committed and the engine reached `completed`.
    Completed {
        /// Committed tick.
        tick: u64,
    },
    /// The engine was already `completed`; the run flag was cleared.
    Finished,
    /// Nothing was scheduled while idle; the run flag was cleared.
    Exhausted,
    /// Paused; nothing happened.
    Paused,
    /// Not running; nothing happened.
    Stopped,
}

impl StepOutcome {
    /// True when this step committed a tick.
    pub fn ticked(self) -> bool {
        matches!(
            self,
            Self::Ticked { .. } | Self::Breakpoint { .. } | Self::Completed { .. }
        )
    }

    /// True when a run loop should exit after this step.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Finished | Self::Exhausted | Self::Stopped
        )
    }
}

/// Outcome of driving the service until it stops making progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks committed by this run.
    pub ticks: u64,
    /// Step that ended the run.
    pub outcome: StepOutcome,
}

/// Command/query façade over one [`EventLoopEngine`].
#[derive(Debug)]
pub struct CqrsService {
    engine: EventLoopEngine,
    snapshots: SnapshotStore,
    log: CommandLogger,
    cache: QueryCache,
    subscribers: ListenerRegistry<Arc<EngineState>>,
    config: ServiceConfig,
    current: Arc<EngineState>,
}

impl CqrsService {
    /// Service keeping all history.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_retention(config, RetentionPolicy::KeepAll)
    }

    /// Service with an explicit history retention policy.
    pub fn with_retention(config: ServiceConfig, retention: RetentionPolicy) -> Self {
        let engine = EventLoopEngine::with_retention(config.limits, retention);
        let current = Arc::new(engine.state().clone());
        Self {
            engine,
            snapshots: SnapshotStore::new(),
            log: CommandLogger::default(),
            cache: QueryCache::default(),
            subscribers: ListenerRegistry::new(),
            config,
            current,
        }
    }

    /// Replaces the command log with one retaining `capacity` entries.
    pub fn with_command_log_capacity(mut self, capacity: usize) -> Self {
        self.log = CommandLogger::new(capacity);
        self
    }

    /// Replaces the query cache with one holding `capacity` results.
    pub fn with_query_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = QueryCache::new(capacity);
        self
    }

    /// Latest published state.
    pub fn state(&self) -> Arc<EngineState> {
        Arc::clone(&self.current)
    }

    /// Read access to the engine.
    pub fn engine(&self) -> &EventLoopEngine {
        &self.engine
    }

    /// Snapshot store.
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Command audit log.
    pub fn command_log(&self) -> &CommandLogger {
        &self.log
    }

    /// Query cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Registers a subscriber notified with every published state.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&Arc<EngineState>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    /// Applies `command` with a default context.
    pub fn dispatch(&mut self, command: Command) -> CommandResult {
        self.dispatch_with(command, CommandContext::now(None))
    }

    /// Validates, applies, logs and publishes `command`.
    pub fn dispatch_with(&mut self, command: Command, ctx: CommandContext) -> CommandResult {
        let was_complete = self.engine.state().phase == Phase::Completed;
        let result = match command.validate().and_then(|()| self.apply(&command)) {
            Ok(message) => {
                debug!(
                    kind = command.kind(),
                    tick = self.engine.state().tick,
                    %message,
                    "command applied"
                );
                self.publish(was_complete);
                CommandResult::ok(Arc::clone(&self.current), message)
            }
            Err(err) => {
                warn!(kind = command.kind(), error_kind = %err.kind(), %err, "command rejected");
                if let (CommandErrorKind::Execution, CommandError::Engine(engine)) =
                    (err.kind(), &err)
                {
                    self.halt(&RunError::Engine(engine.clone()));
                }
                CommandResult::failed(&err)
            }
        };
        self.log
            .record(&command, &ctx, &result, self.engine.state().tick);
        result
    }

    fn apply(&mut self, command: &Command) -> Result<String, CommandError> {
        let engine = &mut self.engine;
        Ok(match command {
            Command::PushFunction { task } => {
                let id = engine.push_call_stack(task.clone())?;
                format!("pushed {} as {id}", task.name)
            }
            Command::PopFunction => {
                let frame = engine.pop_call_stack()?;
                format!("popped {}", frame.name())
            }
            Command::EnqueueMicrotask { task, priority } => {
                let id = engine.enqueue_microtask(task.clone(), *priority)?;
                format!("queued microtask {} as {id}", task.name)
            }
            Command::EnqueueMacrotask { task, delay } => {
                let id = engine.enqueue_macrotask(task.clone(), *delay)?;
                format!("queued macrotask {} as {id} ({delay}ms)", task.name)
            }
            Command::Tick => {
                let state = engine.tick()?;
                format!("tick {}: {}", state.tick, state.phase)
            }
            Command::Rewind { tick } => {
                engine.rewind_to_tick(*tick)?;
                format!("rewound to tick {tick}")
            }
            Command::SetBreakpoint { tick } => {
                if engine.set_breakpoint(*tick) {
                    format!("breakpoint set at tick {tick}")
                } else {
                    format!("breakpoint already set at tick {tick}")
                }
            }
            Command::ClearBreakpoint { tick } => {
                if engine.clear_breakpoint(*tick) {
                    format!("breakpoint cleared at tick {tick}")
                } else {
                    format!("no breakpoint at tick {tick}")
                }
            }
            Command::Pause => {
                engine.set_paused(true);
                "paused".to_owned()
            }
            Command::Resume => {
                engine.set_paused(false);
                "resumed".to_owned()
            }
            Command::Start => {
                engine.set_running(true);
                "started".to_owned()
            }
            Command::Stop => {
                engine.set_running(false);
                "stopped".to_owned()
            }
            Command::CreateSnapshot { name } => {
                let tick = engine.state().tick;
                if self.snapshots.insert(name, engine.capture()).is_some() {
                    format!("snapshot {name:?} replaced at tick {tick}")
                } else {
                    format!("snapshot {name:?} created at tick {tick}")
                }
            }
            Command::RestoreSnapshot { name } => {
                let snapshot = self
                    .snapshots
                    .get(name)
                    .ok_or_else(|| CommandError::UnknownSnapshot { name: name.clone() })?;
                engine.restore(snapshot.capture.clone());
                format!("restored snapshot {name:?} at tick {}", engine.state().tick)
            }
            Command::DeleteSnapshot { name } => {
                self.snapshots
                    .remove(name)
                    .ok_or_else(|| CommandError::UnknownSnapshot { name: name.clone() })?;
                format!("snapshot {name:?} deleted")
            }
            Command::Reset => {
                engine.reset();
                self.snapshots.clear();
                "reset".to_owned()
            }
        })
    }

    /// Answers `query`, from the cache when possible.
    pub fn ask(&mut self, query: &Query) -> Result<QueryResult, QueryError> {
        query.validate()?;
        let tick = self.current.tick;
        let key = CacheKey {
            kind: query.kind(),
            tick,
            filter: query.filter(),
        };
        if query.cacheable() {
            if let Some(data) = self.cache.get(&key) {
                return Ok(QueryResult {
                    tick,
                    cached: true,
                    data,
                });
            }
        }
        let ctx = QueryContext {
            engine: &self.engine,
            state: &self.current,
            snapshots: &self.snapshots,
            log: &self.log,
            cache: self.cache.stats(),
        };
        let data = Arc::new(execute(query, &ctx)?);
        if query.cacheable() {
            self.cache.insert(key, Arc::clone(&data));
        }
        Ok(QueryResult {
            tick,
            cached: false,
            data,
        })
    }

    /// One run-loop firing: tick if running and not paused, pause on a
    /// breakpoint, stop on completion or idle exhaustion.
    pub fn step(&mut self) -> Result<StepOutcome, RunError> {
        let state = self.engine.state();
        if !state.is_running {
            return Ok(StepOutcome::Stopped);
        }
        if state.is_paused {
            return Ok(StepOutcome::Paused);
        }
        let finished = state.phase == Phase::Completed;
        if finished || (state.phase == Phase::Idle && state.queues.is_idle()) {
            self.engine.set_running(false);
            self.publish(true);
            debug!(tick = self.current.tick, finished, "run stopped on its own");
            return Ok(if finished {
                StepOutcome::Finished
            } else {
                StepOutcome::Exhausted
            });
        }

        if let Err(err) = self.engine.tick() {
            let err = RunError::Engine(err);
            self.halt(&err);
            return Err(err);
        }
        let tick = self.engine.state().tick;
        let outcome = if self.engine.state().phase == Phase::Completed {
            StepOutcome::Completed { tick }
        } else if self.engine.at_breakpoint() {
            self.engine.set_paused(true);
            debug!(tick, "paused on breakpoint");
            StepOutcome::Breakpoint { tick }
        } else {
            StepOutcome::Ticked { tick }
        };
        self.publish(false);
        Ok(outcome)
    }

    /// Steps synchronously until a step does not tick, or `max_ticks` ticks
    /// have committed (the run flag is then cleared).
    ///
    /// The run flag must already be set (see [`Command::Start`]).
    pub fn drive(&mut self, max_ticks: u64) -> Result<RunSummary, RunError> {
        let mut ticks = 0;
        loop {
            let outcome = self.step()?;
            if outcome.ticked() {
                ticks += 1;
            }
            let stalled = !matches!(outcome, StepOutcome::Ticked { .. });
            if stalled || ticks >= max_ticks {
                if !stalled {
                    self.engine.set_running(false);
                    self.publish(true);
                }
                return Ok(RunSummary { ticks, outcome });
            }
        }
    }

    /// Stops the run after an execution failure.
    ///
    /// The engine is put back on its last committed history entry (a panicked
    /// tick may have left it half-applied), the run flag is
    /// cleared and `on_error` is called. Subscribers are not notified.
    pub fn halt(&mut self, err: &RunError) {
        error!(%err, tick = self.engine.state().tick, "run halted");
        if let Some(last) = self.engine.history().last_tick() {
            if let Err(rewind) = self.engine.rewind_to_tick(last) {
                error!(%rewind, "could not restore last committed tick");
            }
        }
        self.engine.set_running(false);
        self.current = Arc::new(self.engine.state().clone());
        self.cache.invalidate();
        if let Some(cb) = &self.config.on_error {
            cb(err);
        }
    }

    fn publish(&mut self, was_complete: bool) {
        self.cache.invalidate();
        self.current = Arc::new(self.engine.state().clone());
        self.subscribers.notify(&self.current);
        if let Some(cb) = &self.config.on_state_change {
            cb(&self.current);
        }
        if !was_complete && self.current.phase == Phase::Completed {
            debug!(tick = self.current.tick, "execution complete");
            if let Some(cb) = &self.config.on_execution_complete {
                cb(&self.current);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penguin_loop::TaskSpec;

    fn service() -> CqrsService {
        CqrsService::new(ServiceConfig::default())
    }

    #[test]
    fn failed_command_does_not_publish() {
        let mut svc = service();
        let before = svc.state();
        let result = svc.dispatch(Command::PopFunction);
        assert!(!result.success);
        assert_eq!(result.error, Some(CommandErrorKind::InvalidState));
        assert!(Arc::ptr_eq(&before, &svc.state()));
        assert_eq!(svc.command_log().len(), 1);
    }

    #[test]
    fn successful_command_returns_the_published_state() {
        let mut svc = service();
        let result = svc.dispatch(Command::PushFunction {
            task: TaskSpec::new("main"),
        });
        assert!(result.success);
        let state = result.state.unwrap();
        assert!(Arc::ptr_eq(&state, &svc.state()));
        assert_eq!(state.queues.call_stack.names(), vec!["main"]);
    }

    #[test]
    fn step_without_start_is_stopped() {
        let mut svc = service();
        assert_eq!(svc.step().unwrap(), StepOutcome::Stopped);
    }

    #[test]
    fn idle_exhaustion_stops_without_ticking() {
        let mut svc = service();
        svc.dispatch(Command::Start);
        assert_eq!(svc.step().unwrap(), StepOutcome::Exhausted);
        assert!(!svc.state().is_running);
        assert_eq!(svc.state().tick, 0);
    }

    #[test]
    fn drive_respects_max_ticks() {
        let mut svc = service();
        svc.dispatch(Command::EnqueueMacrotask {
            task: TaskSpec::new("t"),
            delay: 0,
        });
        svc.dispatch(Command::Start);
        let summary = svc.drive(2).unwrap();
        assert_eq!(summary.ticks, 2);
        assert!(!svc.state().is_running);
    }
}
