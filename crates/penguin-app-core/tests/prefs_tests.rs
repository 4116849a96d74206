// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Round-trips simulator preferences through the config service.

use penguin_app_core::config::{ConfigError, ConfigService};
use penguin_app_core::prefs::{SimulatorPrefs, SIMULATOR_PREFS_KEY};
use penguin_dry_tests::InMemoryConfigStore;
use penguin_loop::RetentionPolicy;

#[test]
fn missing_prefs_fall_back_to_defaults() {
    let service = ConfigService::new(InMemoryConfigStore::new());
    let prefs = SimulatorPrefs::load(&service).unwrap();
    assert_eq!(prefs, SimulatorPrefs::default());
    assert_eq!(prefs.limits.max_call_stack_size, 100);
}

#[test]
fn saved_prefs_load_back() {
    let store = InMemoryConfigStore::new();
    let service = ConfigService::new(store.clone());
    let mut prefs = SimulatorPrefs::default();
    prefs.limits.max_microtask_queue_size = 8;
    prefs.tick_interval_ms = 50;
    prefs.retention = RetentionPolicy::KeepRecent { window: 64 };
    prefs.save(&service).unwrap();

    assert!(store.contains_key(SIMULATOR_PREFS_KEY));
    assert_eq!(SimulatorPrefs::load(&service).unwrap(), prefs);
}

#[test]
fn partial_json_keeps_remaining_defaults() {
    let store = InMemoryConfigStore::new();
    store.insert_raw(SIMULATOR_PREFS_KEY, br#"{"tick_interval_ms": 20}"#);
    let prefs = SimulatorPrefs::load(&ConfigService::new(store)).unwrap();
    assert_eq!(prefs.tick_interval_ms, 20);
    assert_eq!(prefs.limits, SimulatorPrefs::default().limits);
}

#[test]
fn zero_capacity_is_rejected_on_load_and_save() {
    let store = InMemoryConfigStore::new();
    store.insert_raw(
        SIMULATOR_PREFS_KEY,
        br#"{"limits": {"max_call_stack_size": 0}}"#,
    );
    let service = ConfigService::new(store);
    assert!(matches!(
        SimulatorPrefs::load(&service),
        Err(ConfigError::Invalid(_))
    ));

    let mut prefs = SimulatorPrefs::default();
    prefs.retention = RetentionPolicy::KeepRecent { window: 0 };
    assert!(matches!(prefs.save(&service), Err(ConfigError::Invalid(_))));
}

#[test]
fn store_failures_propagate() {
    let store = InMemoryConfigStore::new();
    store.set_fail_on_load(true);
    let service = ConfigService::new(store);
    assert!(matches!(
        SimulatorPrefs::load(&service),
        Err(ConfigError::Other(_))
    ));
}
