// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Queries: read-only projections over the simulator.
//!
//! [`execute`] is a pure function of a [`QueryContext`]. It never ticks the
//! engine and never touches breakpoints or snapshots.

use std::fmt;
use std::sync::Arc;

use penguin_loop::{
    EngineState, EventKind, EventLoopEngine, ExecutionEvent, HistoryEntry, QueueDebugInfo,
    QueueName, StackTraceFrame, Task,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheStats;
use crate::logger::{CommandLogEntry, CommandLogger};
use crate::snapshots::{SnapshotInfo, SnapshotStore};

/// A read request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Query {
    /// The whole engine state.
    CurrentState,
    /// Call-stack frames, bottom first.
    CallStack,
    /// Occupancy of all three containers.
    QueueState,
    /// Retained history, optionally limited to `from..=to`.
    ExecutionHistory {
        /// First tick, inclusive.
        #[serde(default)]
        from: Option<u64>,
        /// Last tick, inclusive.
        #[serde(default)]
        to: Option<u64>,
    },
    /// Logged events of one kind.
    EventsByType {
        /// Kind to select.
        kind: EventKind,
    },
    /// Counters and tick timings.
    PerformanceMetrics,
    /// Stack trace, top frame first.
    StackTrace,
    /// Breakpoint ticks, ascending.
    Breakpoints,
    /// Snapshot listing.
    Snapshots,
    /// Container pressure and error summary.
    Health,
    /// Most recent audited commands.
    CommandLog {
        /// Maximum entries returned.
        limit: usize,
    },
}

impl Query {
    /// Stable kebab-case tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CurrentState => "current-state",
            Self::CallStack => "call-stack",
            Self::QueueState => "queue-state",
            Self::ExecutionHistory { .. } => "execution-history",
            Self::EventsByType { .. } => "events-by-type",
            Self::PerformanceMetrics => "performance-metrics",
            Self::StackTrace => "stack-trace",
            Self::Breakpoints => "breakpoints",
            Self::Snapshots => "snapshots",
            Self::Health => "health",
            Self::CommandLog { .. } => "command-log",
        }
    }

    /// Parameters rendered for use in a cache key.
    pub fn filter(&self) -> String {
        match self {
            Self::ExecutionHistory { from, to } => format!("{from:?}..={to:?}"),
            Self::EventsByType { kind } => kind.as_str().to_owned(),
            Self::CommandLog { limit } => limit.to_string(),
            _ => String::new(),
        }
    }

    /// Whether results may be served from the cache.
    ///
    /// The command log and metrics change without a successful command
    /// (failed dispatches are logged, cache counters move on every lookup).
    pub fn cacheable(&self) -> bool {
        !matches!(self, Self::CommandLog { .. } | Self::PerformanceMetrics)
    }

    /// Rejects malformed parameters.
    pub fn validate(&self) -> Result<(), QueryError> {
        if let Self::ExecutionHistory {
            from: Some(from),
            to: Some(to),
        } = self
        {
            if from > to {
                return Err(QueryError::InvalidRange {
                    from: *from,
                    to: *to,
                });
            }
        }
        Ok(())
    }
}

/// Why a query was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// `from` is after `to`.
    #[error("invalid tick range {from}..={to}")]
    InvalidRange {
        /// First tick.
        from: u64,
        /// Last tick.
        to: u64,
    },
}

/// Everything a query may read.
#[derive(Clone, Copy, Debug)]
pub struct QueryContext<'a> {
    /// The engine.
    pub engine: &'a EventLoopEngine,
    /// Latest published state.
    pub state: &'a Arc<EngineState>,
    /// Snapshot store.
    pub snapshots: &'a SnapshotStore,
    /// Command audit log.
    pub log: &'a CommandLogger,
    /// Query cache counters.
    pub cache: CacheStats,
}

/// Counters and timings for the performance-metrics query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Current tick.
    pub tick: u64,
    /// Frames and microtasks executed.
    pub total_executed: u64,
    /// Capacity failures recorded.
    pub error_count: u64,
    /// Deepest call stack observed.
    pub max_call_stack_depth: usize,
    /// Ticks measured since reset or restore.
    pub ticks_measured: u64,
    /// Mean tick duration, microseconds.
    pub average_tick_micros: u64,
    /// Longest tick, microseconds.
    pub max_tick_micros: u64,
    /// Retained history entries.
    pub history_len: usize,
    /// Logged events.
    pub event_count: usize,
    /// Query cache hits.
    pub cache_hits: u64,
    /// Query cache misses.
    pub cache_misses: u64,
}

/// Overall health classification. Ordered from best to worst.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    /// Every container below 80 % and no errors recorded.
    Healthy,
    /// A container at 80 % or more, or errors recorded.
    Degraded,
    /// A container is full.
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        })
    }
}

/// Occupancy of one container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerUsage {
    /// Container.
    pub queue: QueueName,
    /// Current length.
    pub len: usize,
    /// Configured capacity.
    pub capacity: usize,
}

impl ContainerUsage {
    /// Whole-percent occupancy (100 for a zero-capacity container).
    pub fn percent(&self) -> usize {
        if self.capacity == 0 {
            100
        } else {
            self.len * 100 / self.capacity
        }
    }

    /// At or above capacity.
    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// At or above 80 % of capacity.
    pub fn is_pressured(&self) -> bool {
        self.len * 5 >= self.capacity * 4
    }
}

/// Result of the health query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Classification.
    pub status: HealthStatus,
    /// Per-container occupancy.
    pub usage: Vec<ContainerUsage>,
    /// Capacity failures recorded.
    pub error_count: u64,
    /// Human-readable findings, empty when healthy.
    pub issues: Vec<String>,
}

/// Classifies `state`.
pub fn health(state: &EngineState) -> HealthReport {
    let q = &state.queues;
    let usage = vec![
        ContainerUsage {
            queue: QueueName::CallStack,
            len: q.call_stack.len(),
            capacity: q.call_stack.capacity(),
        },
        ContainerUsage {
            queue: QueueName::Microtasks,
            len: q.microtasks.len(),
            capacity: q.microtasks.capacity(),
        },
        ContainerUsage {
            queue: QueueName::Macrotasks,
            len: q.macrotasks.len(),
            capacity: q.macrotasks.capacity(),
        },
    ];
    let mut status = HealthStatus::Healthy;
    let mut issues = Vec::new();
    for u in &usage {
        if u.is_full() {
            status = HealthStatus::Critical;
            issues.push(format!("{} is full ({}/{})", u.queue, u.len, u.capacity));
        } else if u.is_pressured() {
            status = status.max(HealthStatus::Degraded);
            issues.push(format!("{} at {}% of capacity", u.queue, u.percent()));
        }
    }
    if state.stats.error_count > 0 {
        status = status.max(HealthStatus::Degraded);
        issues.push(format!(
            "{} capacity error(s) recorded",
            state.stats.error_count
        ));
    }
    HealthReport {
        status,
        usage,
        error_count: state.stats.error_count,
        issues,
    }
}

/// Payload of a [`QueryResult`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum QueryData {
    /// Full state.
    State(Arc<EngineState>),
    /// Frames, bottom first.
    CallStack(Vec<Task>),
    /// Container occupancy.
    Queues(QueueDebugInfo),
    /// History entries in tick order.
    History(Vec<Arc<HistoryEntry>>),
    /// Matching events in log order.
    Events(Vec<ExecutionEvent>),
    /// Counters and timings.
    Metrics(PerformanceMetrics),
    /// Top frame first.
    StackTrace(Vec<StackTraceFrame>),
    /// Ascending breakpoint ticks.
    Breakpoints(Vec<u64>),
    /// Snapshot listing.
    Snapshots(Vec<SnapshotInfo>),
    /// Health report.
    Health(HealthReport),
    /// Audit log entries, oldest first.
    CommandLog(Vec<CommandLogEntry>),
}

/// Outcome of a query.
#[derive(Clone, Debug)]
pub struct QueryResult {
    /// Tick the data was computed at.
    pub tick: u64,
    /// Whether the data came from the cache.
    pub cached: bool,
    /// The projection.
    pub data: Arc<QueryData>,
}

fn micros(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Computes `query` against `ctx`.
pub fn execute(query: &Query, ctx: &QueryContext<'_>) -> Result<QueryData, QueryError> {
    query.validate()?;
    let state = ctx.state;
    Ok(match query {
        Query::CurrentState => QueryData::State(Arc::clone(state)),
        Query::CallStack => QueryData::CallStack(state.queues.call_stack.iter().cloned().collect()),
        Query::QueueState => QueryData::Queues(state.queues.debug_info()),
        Query::ExecutionHistory { from, to } => {
            let history = ctx.engine.history();
            let from = from.or_else(|| history.first_tick()).unwrap_or(0);
            let to = to.or_else(|| history.last_tick()).unwrap_or(0);
            QueryData::History(history.range(from, to))
        }
        Query::EventsByType { kind } => {
            QueryData::Events(ctx.engine.events().of_kind(*kind).cloned().collect())
        }
        Query::PerformanceMetrics => {
            let timings = ctx.engine.timings();
            QueryData::Metrics(PerformanceMetrics {
                tick: state.tick,
                total_executed: state.stats.total_executed,
                error_count: state.stats.error_count,
                max_call_stack_depth: state.stats.max_call_stack_depth,
                ticks_measured: timings.count,
                average_tick_micros: micros(timings.average()),
                max_tick_micros: micros(timings.max),
                history_len: ctx.engine.history().len(),
                event_count: ctx.engine.events().len(),
                cache_hits: ctx.cache.hits,
                cache_misses: ctx.cache.misses,
            })
        }
        Query::StackTrace => QueryData::StackTrace(state.queues.stack_trace()),
        Query::Breakpoints => QueryData::Breakpoints(state.breakpoints.iter().copied().collect()),
        Query::Snapshots => QueryData::Snapshots(ctx.snapshots.list()),
        Query::Health => QueryData::Health(health(state)),
        Query::CommandLog { limit } => QueryData::CommandLog(ctx.log.latest(*limit)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use penguin_loop::{EngineLimits, Priority, TaskSpec};

    fn limits() -> EngineLimits {
        EngineLimits {
            max_call_stack_size: 5,
            max_microtask_queue_size: 5,
            max_macrotask_queue_size: 10,
        }
    }

    #[test]
    fn empty_engine_is_healthy() {
        let engine = EventLoopEngine::new(limits());
        let report = health(engine.state());
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn eighty_percent_is_degraded_and_full_is_critical() {
        let mut engine = EventLoopEngine::new(limits());
        for i in 0..4 {
            engine
                .enqueue_microtask(TaskSpec::new(format!("m{i}")), Priority::Normal)
                .unwrap();
        }
        assert_eq!(health(engine.state()).status, HealthStatus::Degraded);
        engine
            .enqueue_microtask(TaskSpec::new("m4"), Priority::Normal)
            .unwrap();
        let report = health(engine.state());
        assert_eq!(report.status, HealthStatus::Critical);
        assert_eq!(report.usage[1].percent(), 100);
    }

    #[test]
    fn inverted_history_range_is_rejected() {
        let q = Query::ExecutionHistory {
            from: Some(4),
            to: Some(2),
        };
        assert_eq!(
            q.validate(),
            Err(QueryError::InvalidRange { from: 4, to: 2 })
        );
    }

    #[test]
    fn filter_distinguishes_parameters() {
        let a = Query::EventsByType {
            kind: EventKind::Completed,
        };
        let b = Query::EventsByType {
            kind: EventKind::PhaseChanged,
        };
        assert_eq!(a.kind(), b.kind());
        assert_ne!(a.filter(), b.filter());
        assert!(!Query::CommandLog { limit: 5 }.cacheable());
    }
}
