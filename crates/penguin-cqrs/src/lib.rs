// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! penguin-cqrs: command/query service over the PenguinJS event-loop engine.
//!
//! Writes go through [`CqrsService::dispatch`] as validated [`Command`]s and
//! reads through [`CqrsService::ask`] as [`Query`] projections. The service
//! owns named snapshots, a bounded command audit log and a query cache, and
//! fans published states out to subscribers. [`RunLoop`] drives ticks on a
//! tokio interval.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cache;
pub mod command;
pub mod config;
pub mod logger;
pub mod query;
pub mod runner;
pub mod service;
pub mod snapshots;

pub use cache::{CacheKey, CacheStats, QueryCache};
pub use command::{
    Command, CommandContext, CommandError, CommandErrorKind, CommandResult, MAX_NAME_LEN,
    MAX_SCHEDULE_DEPTH, MAX_TIMER_DELAY_MS,
};
pub use config::{ErrorCallback, ServiceConfig, StateCallback};
pub use logger::{CommandLogEntry, CommandLogger, DEFAULT_COMMAND_LOG_CAPACITY};
pub use query::{
    health, ContainerUsage, HealthReport, HealthStatus, PerformanceMetrics, Query, QueryContext,
    QueryData, QueryError, QueryResult,
};
pub use runner::{RunError, RunHandle, RunLoop, SharedService};
pub use service::{CqrsService, RunSummary, StepOutcome};
pub use snapshots::{Snapshot, SnapshotInfo, SnapshotStore};
