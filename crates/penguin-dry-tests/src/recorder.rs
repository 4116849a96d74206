// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Service config whose lifecycle callbacks record what they saw.

use std::sync::{Arc, Mutex};

use penguin_cqrs::ServiceConfig;
use penguin_loop::EngineLimits;

#[derive(Default)]
struct Seen {
    state_ticks: Vec<u64>,
    completions: Vec<u64>,
    errors: Vec<String>,
}

/// Records every `on_state_change`, `on_execution_complete` and `on_error`
/// call made through the config it builds.
#[derive(Clone, Default)]
pub struct CallbackRecorder {
    seen: Arc<Mutex<Seen>>,
}

impl CallbackRecorder {
    /// Fresh recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Seen> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Service config with `limits` and all three callbacks wired to this
    /// recorder.
    pub fn config(&self, limits: EngineLimits) -> ServiceConfig {
        let states = self.clone();
        let completions = self.clone();
        let errors = self.clone();
        ServiceConfig::new(limits)
            .on_state_change(move |s| states.lock().state_ticks.push(s.tick))
            .on_execution_complete(move |s| completions.lock().completions.push(s.tick))
            .on_error(move |e| errors.lock().errors.push(e.to_string()))
    }

    /// Tick of every published state, in order.
    pub fn state_ticks(&self) -> Vec<u64> {
        self.lock().state_ticks.clone()
    }

    /// Tick at which each completion was reported.
    pub fn completions(&self) -> Vec<u64> {
        self.lock().completions.clone()
    }

    /// Rendered run errors.
    pub fn errors(&self) -> Vec<String> {
        self.lock().errors.clone()
    }
}
