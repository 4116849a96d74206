// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `penguin`: run event-loop scenarios from the terminal and manage the
//! simulator preferences shared with the other PenguinJS tools.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use penguin_app_core::config::ConfigService;
use penguin_app_core::prefs::SimulatorPrefs;
use penguin_config_fs::FsConfigStore;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod prefs_cmd;
mod render;
mod run;
mod scenario;

#[derive(Parser, Debug)]
#[command(author, version, about = "PenguinJS event-loop simulator CLI")]
struct Cli {
    /// Directory holding saved preferences (defaults to the platform config dir).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Apply a JSON command script and print the resulting timeline.
    Run(RunArgs),
    /// Parse and validate a command script without running it.
    Validate {
        /// Path to the script (a JSON array of commands).
        scenario: PathBuf,
    },
    /// Show or edit saved simulator preferences.
    #[command(subcommand)]
    Prefs(PrefsCmd),
}

#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Path to the script (a JSON array of commands).
    pub scenario: PathBuf,

    /// Start the run loop after the script, even if it never sends `start`.
    #[arg(long)]
    pub start: bool,

    /// Run-loop interval in milliseconds; overrides the saved preference.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Stop the run loop after it has committed this many ticks.
    #[arg(long, default_value_t = 10_000)]
    pub max_ticks: u64,

    /// Exit non-zero when any command was rejected.
    #[arg(long)]
    pub strict: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    #[command(flatten)]
    pub limits: LimitArgs,
}

/// Capacity overrides shared by `run` and `prefs set`.
#[derive(Args, Debug, Default)]
pub(crate) struct LimitArgs {
    /// Call stack capacity.
    #[arg(long)]
    pub stack: Option<usize>,
    /// Microtask queue capacity.
    #[arg(long)]
    pub microtasks: Option<usize>,
    /// Macrotask queue capacity.
    #[arg(long)]
    pub macrotasks: Option<usize>,
}

impl LimitArgs {
    pub(crate) fn apply(&self, prefs: &mut SimulatorPrefs) {
        if let Some(n) = self.stack {
            prefs.limits.max_call_stack_size = n;
        }
        if let Some(n) = self.microtasks {
            prefs.limits.max_microtask_queue_size = n;
        }
        if let Some(n) = self.macrotasks {
            prefs.limits.max_macrotask_queue_size = n;
        }
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum PrefsCmd {
    /// Print the effective preferences as JSON.
    Show,
    /// Update and save preferences.
    Set {
        #[command(flatten)]
        limits: LimitArgs,
        /// Run-loop interval in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Keep only the most recent N history entries.
        #[arg(long, conflicts_with = "keep_all")]
        keep_recent: Option<usize>,
        /// Keep the whole history.
        #[arg(long)]
        keep_all: bool,
    },
    /// Delete saved preferences.
    Reset,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Format {
    Table,
    Json,
}

fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn config_service(dir: Option<&PathBuf>) -> Result<ConfigService<FsConfigStore>> {
    let store = match dir {
        Some(dir) => FsConfigStore::at(dir),
        None => FsConfigStore::new(),
    }
    .context("open config directory")?;
    Ok(ConfigService::new(store))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log);
    let config = config_service(cli.config_dir.as_ref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let code = match cli.command {
        Cmd::Run(args) => {
            let prefs = SimulatorPrefs::load(&config).unwrap_or_else(|err| {
                warn!(%err, "saved preferences unusable; using defaults");
                SimulatorPrefs::default()
            });
            let report = run::run(&args, prefs).await?;
            match args.format {
                Format::Table => render::table(&report, &mut out)?,
                Format::Json => render::json(&report, &mut out)?,
            }
            if args.strict && report.rejected() > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Cmd::Validate { scenario } => {
            let commands = scenario::load(&scenario)?;
            let problems = scenario::problems(&commands);
            for (index, kind, err) in &problems {
                writeln!(out, "#{index} {kind}: {err}")?;
            }
            if problems.is_empty() {
                writeln!(out, "ok: {} commands", commands.len())?;
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Cmd::Prefs(cmd) => {
            prefs_cmd::run(&cmd, &config, &mut out)?;
            ExitCode::SUCCESS
        }
    };
    out.flush()?;
    Ok(code)
}
