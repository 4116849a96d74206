// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Async run loop: one [`CqrsService::step`] per timer firing.
//!
//! The loop takes the service lock for each step only, so commands dispatched
//! from elsewhere (pause, stop, breakpoints) interleave between ticks and take
//! effect before the next one. A tick in flight always completes.
//!
//! A panic inside a step (typically a subscriber callback) ends the spawned
//! task. [`RunHandle::join`] turns it into [`RunError::Panicked`], puts the
//! engine back on its last committed tick and reports through `on_error`.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use penguin_loop::EngineError;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, instrument};

use crate::service::{CqrsService, RunSummary};

/// Service shared between the run loop and command senders.
pub type SharedService = Arc<Mutex<CqrsService>>;

/// Why a run ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// The engine failed while ticking.
    #[error("engine error during run: {0}")]
    Engine(#[from] EngineError),
    /// A step panicked.
    #[error("run loop panicked: {0}")]
    Panicked(String),
    /// The run-loop task was aborted.
    #[error("run loop cancelled")]
    Cancelled,
}

/// Interval-driven run loop over a [`SharedService`].
#[derive(Debug, Clone)]
pub struct RunLoop {
    service: SharedService,
    interval: Duration,
}

impl RunLoop {
    /// Loop stepping `service` every `interval` (at least 1ms).
    pub fn new(service: SharedService, interval: Duration) -> Self {
        Self {
            service,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Steps until a terminal outcome. Paused steps keep the loop alive so a
    /// later resume continues the run.
    #[instrument(skip(self), fields(interval = ?self.interval))]
    pub async fn run(self) -> Result<RunSummary, RunError> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("run loop started");

        let mut ticks = 0;
        loop {
            ticker.tick().await;
            let outcome = self.service.lock().await.step()?;
            if outcome.ticked() {
                ticks += 1;
            }
            if outcome.is_terminal() {
                info!(ticks, ?outcome, "run loop finished");
                return Ok(RunSummary { ticks, outcome });
            }
        }
    }

    /// Runs the loop on the tokio runtime.
    pub fn spawn(self) -> RunHandle {
        let service = Arc::clone(&self.service);
        RunHandle {
            service,
            task: tokio::spawn(self.run()),
        }
    }
}

/// Handle to a spawned [`RunLoop`].
#[derive(Debug)]
pub struct RunHandle {
    service: SharedService,
    task: JoinHandle<Result<RunSummary, RunError>>,
}

impl RunHandle {
    /// Waits for the loop to end.
    pub async fn join(self) -> Result<RunSummary, RunError> {
        match self.task.await {
            Ok(result) => result,
            Err(join) => {
                let err = if join.is_panic() {
                    RunError::Panicked(panic_message(join.into_panic()))
                } else {
                    RunError::Cancelled
                };
                self.service.lock().await.halt(&err);
                Err(err)
            }
        }
    }

    /// Aborts the loop; [`Self::join`] then reports [`RunError::Cancelled`].
    pub fn abort(&self) {
        self.task.abort();
    }

    /// True once the loop task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
