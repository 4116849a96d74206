// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `penguin run`: apply a script, optionally drive the run loop, report.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use penguin_app_core::prefs::SimulatorPrefs;
use penguin_cqrs::{
    Command, CommandContext, CqrsService, RunLoop, RunSummary, ServiceConfig, SharedService,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::render::{CommandRow, Report};
use crate::RunArgs;

const CALLER: &str = "penguin-cli";

/// Runs the script and builds its report.
pub async fn run(args: &RunArgs, mut prefs: SimulatorPrefs) -> Result<Report> {
    let commands = crate::scenario::load(&args.scenario)?;
    args.limits.apply(&mut prefs);
    if let Some(ms) = args.interval_ms {
        prefs.tick_interval_ms = ms;
    }
    let limits = prefs.engine_limits().context("invalid limits")?;

    let mut service = CqrsService::with_retention(ServiceConfig::new(limits), prefs.retention);
    let mut rows = Vec::with_capacity(commands.len());
    for command in commands {
        let kind = command.kind();
        let result = service.dispatch_with(command, CommandContext::now(Some(CALLER.to_owned())));
        rows.push(CommandRow::new(kind, &result));
    }
    let rejected = rows.iter().filter(|row| !row.success).count();
    info!(commands = rows.len(), rejected, "script applied");

    if args.start && !service.state().is_running {
        let result =
            service.dispatch_with(Command::Start, CommandContext::now(Some(CALLER.to_owned())));
        rows.push(CommandRow::new(Command::Start.kind(), &result));
    }

    let shared: SharedService = Arc::new(Mutex::new(service));
    let state = shared.lock().await.state();
    let summary = if state.is_running && !state.is_paused {
        Some(drive(&shared, prefs.tick_interval(), args.max_ticks).await?)
    } else {
        if state.is_running {
            warn!(tick = state.tick, "script left the engine paused; not driving");
        }
        None
    };

    let service = shared.lock().await;
    Ok(Report::new(rows, summary, &service))
}

/// Runs the loop until it finishes on its own, hits a breakpoint or
/// commits `max_ticks` beyond the tick it started from. The last two end the
/// run with a `stop`.
async fn drive(shared: &SharedService, interval: Duration, max_ticks: u64) -> Result<RunSummary> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watch = {
        let svc = shared.lock().await;
        let budget_end = svc.state().tick.saturating_add(max_ticks);
        svc.subscribe(move |state| {
            if state.is_paused || state.tick >= budget_end {
                // Receiver gone means the run is already over.
                let _ = tx.send(state.tick);
            }
        })
    };

    let stopper = {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            if let Some(tick) = rx.recv().await {
                debug!(tick, "stopping run loop");
                shared.lock().await.dispatch_with(
                    Command::Stop,
                    CommandContext::now(Some(CALLER.to_owned())),
                );
            }
        })
    };

    let result = RunLoop::new(Arc::clone(shared), interval).spawn().join().await;
    stopper.abort();
    watch.unsubscribe();

    match result {
        Ok(summary) => {
            info!(ticks = summary.ticks, outcome = ?summary.outcome, "run finished");
            Ok(summary)
        }
        Err(err) => {
            warn!(%err, "run loop failed");
            Err(err).context("run loop")
        }
    }
}
