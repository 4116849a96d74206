// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Command scripts: a JSON array of serialized [`Command`]s.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use penguin_cqrs::{Command, CommandError};

/// Reads and parses a script.
pub fn load(path: &Path) -> Result<Vec<Command>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read scenario {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse scenario {}", path.display()))
}

/// Commands that would be rejected by validation, as `(index, kind, error)`.
pub fn problems(commands: &[Command]) -> Vec<(usize, &'static str, CommandError)> {
    commands
        .iter()
        .enumerate()
        .filter_map(|(i, cmd)| cmd.validate().err().map(|err| (i, cmd.kind(), err)))
        .collect()
}
