// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for PenguinJS tools (config storage port,
//! simulator preferences). Keeps the CLI and other front ends thin.

pub mod config;
pub mod prefs;
