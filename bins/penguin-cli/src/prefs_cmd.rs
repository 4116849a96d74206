// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `penguin prefs`.

use std::io::Write;

use anyhow::{Context, Result};
use penguin_app_core::config::{ConfigService, ConfigStore};
use penguin_app_core::prefs::{SimulatorPrefs, SIMULATOR_PREFS_KEY};
use penguin_loop::RetentionPolicy;
use tracing::info;

use crate::PrefsCmd;

pub fn run<S: ConfigStore>(
    cmd: &PrefsCmd,
    config: &ConfigService<S>,
    out: &mut impl Write,
) -> Result<()> {
    match cmd {
        PrefsCmd::Show => {
            let prefs = SimulatorPrefs::load(config).context("load preferences")?;
            print_json(&prefs, out)
        }
        PrefsCmd::Set {
            limits,
            interval_ms,
            keep_recent,
            keep_all,
        } => {
            let mut prefs = SimulatorPrefs::load(config).unwrap_or_default();
            limits.apply(&mut prefs);
            if let Some(ms) = *interval_ms {
                prefs.tick_interval_ms = ms;
            }
            if let Some(window) = *keep_recent {
                prefs.retention = RetentionPolicy::KeepRecent { window };
            } else if *keep_all {
                prefs.retention = RetentionPolicy::KeepAll;
            }
            prefs.save(config).context("save preferences")?;
            info!("preferences saved");
            print_json(&prefs, out)
        }
        PrefsCmd::Reset => {
            config
                .remove(SIMULATOR_PREFS_KEY)
                .context("remove preferences")?;
            writeln!(out, "preferences reset to defaults")?;
            Ok(())
        }
    }
}

fn print_json(prefs: &SimulatorPrefs, out: &mut impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, prefs)?;
    writeln!(out)?;
    Ok(())
}
