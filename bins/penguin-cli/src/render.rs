// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Run reports, as tables or JSON.

use std::io::Write;

use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use penguin_cqrs::{CommandResult, CqrsService, RunSummary, StepOutcome};
use penguin_loop::EngineState;
use serde::Serialize;

/// Digest prefix length shown in tables.
const SHORT_DIGEST: usize = 16;

#[derive(Debug, Serialize)]
pub struct CommandRow {
    pub command: &'static str,
    pub success: bool,
    pub error: Option<&'static str>,
    pub message: String,
}

impl CommandRow {
    pub fn new(command: &'static str, result: &CommandResult) -> Self {
        Self {
            command,
            success: result.success,
            error: result.error.map(|kind| kind.as_str()),
            message: result.message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunRow {
    pub ticks: u64,
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HistoryRow {
    pub tick: u64,
    pub phase: &'static str,
    pub call_stack: Vec<String>,
    pub microtasks: usize,
    pub macrotasks: usize,
    pub executed: u64,
    pub digest: String,
}

impl HistoryRow {
    fn new(state: &EngineState) -> Self {
        Self {
            tick: state.tick,
            phase: state.phase.as_str(),
            call_stack: state.queues.call_stack.names(),
            microtasks: state.queues.microtasks.len(),
            macrotasks: state.queues.macrotasks.len(),
            executed: state.stats.total_executed,
            digest: state.digest_hex(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub commands: Vec<CommandRow>,
    pub run: Option<RunRow>,
    pub history: Vec<HistoryRow>,
    #[serde(rename = "final")]
    pub last: HistoryRow,
    pub errors: u64,
}

impl Report {
    pub fn new(
        commands: Vec<CommandRow>,
        summary: Option<RunSummary>,
        service: &CqrsService,
    ) -> Self {
        let state = service.state();
        Self {
            commands,
            run: summary.map(|s| RunRow {
                ticks: s.ticks,
                outcome: outcome_label(s.outcome),
            }),
            history: service
                .engine()
                .execution_history()
                .iter()
                .map(|entry| HistoryRow::new(&entry.state))
                .collect(),
            last: HistoryRow::new(&state),
            errors: state.stats.error_count,
        }
    }

    /// Commands the service turned down.
    pub fn rejected(&self) -> usize {
        self.commands.iter().filter(|row| !row.success).count()
    }
}

fn outcome_label(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Ticked { .. } => "ticked",
        StepOutcome::Breakpoint { .. } => "breakpoint",
        StepOutcome::Completed { .. } => "completed",
        StepOutcome::Finished => "finished",
        StepOutcome::Exhausted => "exhausted",
        StepOutcome::Paused => "paused",
        StepOutcome::Stopped => "stopped",
    }
}

fn short(digest: &str) -> &str {
    digest.get(..SHORT_DIGEST).unwrap_or(digest)
}

pub fn table(report: &Report, out: &mut impl Write) -> Result<()> {
    let mut commands = Table::new();
    commands
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "command", "ok", "message"]);
    for (i, row) in report.commands.iter().enumerate() {
        let message = match row.error {
            Some(kind) => format!("{kind}: {}", row.message),
            None => row.message.clone(),
        };
        commands.add_row(vec![
            i.to_string(),
            row.command.to_owned(),
            if row.success { "yes" } else { "no" }.to_owned(),
            message,
        ]);
    }
    writeln!(out, "{commands}")?;

    let mut history = Table::new();
    history
        .load_preset(UTF8_FULL)
        .set_header(vec!["tick", "phase", "call stack", "micro", "macro", "executed", "digest"]);
    for row in &report.history {
        history.add_row(vec![
            row.tick.to_string(),
            row.phase.to_owned(),
            row.call_stack.join(" > "),
            row.microtasks.to_string(),
            row.macrotasks.to_string(),
            row.executed.to_string(),
            short(&row.digest).to_owned(),
        ]);
    }
    writeln!(out, "{history}")?;

    if let Some(run) = &report.run {
        writeln!(out, "run: {} ticks, {}", run.ticks, run.outcome)?;
    }
    writeln!(
        out,
        "final: tick {} phase {} executed {} errors {} digest {}",
        report.last.tick,
        report.last.phase,
        report.last.executed,
        report.errors,
        short(&report.last.digest),
    )?;
    Ok(())
}

pub fn json(report: &Report, out: &mut impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}
