// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for PenguinJS crates.
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`recorder`] - Service config whose callbacks record what they saw
//! - [`scenarios`] - Canned command sequences (promise vs. timeout, nesting, floods)
//! - [`tasks`] - Short constructors for task specs by source

pub mod config;
pub mod recorder;
pub mod scenarios;
pub mod tasks;

pub use config::InMemoryConfigStore;
pub use recorder::CallbackRecorder;
pub use scenarios::Scenario;
pub use tasks::{event_handler, io_callback, promise, queued, sync_fn, timer};
