// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Saved simulator preferences: container limits, run-loop pace and history
//! retention.

use std::time::Duration;

use penguin_loop::{EngineLimits, RetentionPolicy};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigService, ConfigStore};

/// Config key the preferences are stored under.
pub const SIMULATOR_PREFS_KEY: &str = "simulator";

/// Default run-loop interval.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

/// Upper bound for any single container capacity.
pub const MAX_CAPACITY: usize = 1_000_000;

/// Upper bound for the run-loop interval.
pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;

/// Preferences for the simulator service and its run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorPrefs {
    /// Container capacities.
    pub limits: EngineLimits,
    /// Run-loop interval in milliseconds.
    pub tick_interval_ms: u64,
    /// History retention.
    pub retention: RetentionPolicy,
}

impl Default for SimulatorPrefs {
    fn default() -> Self {
        Self {
            limits: EngineLimits::default(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            retention: RetentionPolicy::KeepAll,
        }
    }
}

impl SimulatorPrefs {
    /// Checks every field; the first problem found is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("max_call_stack_size", self.limits.max_call_stack_size),
            ("max_microtask_queue_size", self.limits.max_microtask_queue_size),
            ("max_macrotask_queue_size", self.limits.max_macrotask_queue_size),
        ];
        for (field, value) in capacities {
            if value == 0 || value > MAX_CAPACITY {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be between 1 and {MAX_CAPACITY}, got {value}"
                )));
            }
        }
        if self.tick_interval_ms == 0 || self.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "tick_interval_ms must be between 1 and {MAX_TICK_INTERVAL_MS}, got {}",
                self.tick_interval_ms
            )));
        }
        if let RetentionPolicy::KeepRecent { window: 0 } = self.retention {
            return Err(ConfigError::Invalid(
                "retention window must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Validated engine limits.
    pub fn engine_limits(&self) -> Result<EngineLimits, ConfigError> {
        self.validate()?;
        Ok(self.limits)
    }

    /// Run-loop interval.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Loads and validates the saved preferences; defaults when none are saved.
    pub fn load<S: ConfigStore>(config: &ConfigService<S>) -> Result<Self, ConfigError> {
        let prefs: Self = config.load_or_default(SIMULATOR_PREFS_KEY)?;
        prefs.validate()?;
        Ok(prefs)
    }

    /// Validates and saves these preferences.
    pub fn save<S: ConfigStore>(&self, config: &ConfigService<S>) -> Result<(), ConfigError> {
        self.validate()?;
        config.save(SIMULATOR_PREFS_KEY, self)
    }
}
