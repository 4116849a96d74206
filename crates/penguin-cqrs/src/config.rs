// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Construction options for [`crate::CqrsService`].

use std::fmt;
use std::sync::Arc;

use penguin_loop::{EngineLimits, EngineState};

use crate::runner::RunError;

/// Callback receiving a published state.
pub type StateCallback = Arc<dyn Fn(&Arc<EngineState>) + Send + Sync>;

/// Callback receiving a run failure.
pub type ErrorCallback = Arc<dyn Fn(&RunError) + Send + Sync>;

/// Service construction config: capacity limits and the three lifecycle
/// callbacks.
#[derive(Clone, Default)]
pub struct ServiceConfig {
    /// Container capacities.
    pub limits: EngineLimits,
    /// Called after every successful command and every run-loop tick.
    pub on_state_change: Option<StateCallback>,
    /// Called when an execution error stops the run.
    pub on_error: Option<ErrorCallback>,
    /// Called once each time the engine reaches `completed`.
    pub on_execution_complete: Option<StateCallback>,
}

impl ServiceConfig {
    /// Config with the given limits and no callbacks.
    pub fn new(limits: EngineLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Sets the maximum call-stack depth.
    pub fn max_call_stack_size(mut self, size: usize) -> Self {
        self.limits.max_call_stack_size = size;
        self
    }

    /// Sets the microtask queue capacity.
    pub fn max_microtask_queue_size(mut self, size: usize) -> Self {
        self.limits.max_microtask_queue_size = size;
        self
    }

    /// Sets the macrotask queue capacity.
    pub fn max_macrotask_queue_size(mut self, size: usize) -> Self {
        self.limits.max_macrotask_queue_size = size;
        self
    }

    /// Registers the state-change callback.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<EngineState>) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    /// Registers the error callback.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Registers the completion callback.
    pub fn on_execution_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<EngineState>) + Send + Sync + 'static,
    {
        self.on_execution_complete = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("limits", &self.limits)
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_execution_complete", &self.on_execution_complete.is_some())
            .finish()
    }
}
