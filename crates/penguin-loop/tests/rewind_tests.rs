// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used)]
//! History and rewind tests: entry `n` reconstructs tick `n`, rewinding is
//! destructive, and rewind followed by replay reproduces the same states.

mod common;

use common::{engine, run_to_completion};
use penguin_loop::{
    EngineError, EngineLimits, EventKind, EventLoopEngine, Phase, Priority, RetentionPolicy,
    TaskSpec,
};

fn seeded() -> EventLoopEngine {
    let mut e = engine();
    e.push_call_stack(
        TaskSpec::new("main")
            .then_microtask(TaskSpec::new("m1").then_macrotask(TaskSpec::new("t2"), 4))
            .then_macrotask(TaskSpec::new("t1"), 0),
    )
    .unwrap();
    e.enqueue_microtask(TaskSpec::new("early"), Priority::High)
        .unwrap();
    e
}

#[test]
fn history_entry_n_matches_state_after_tick_n() {
    let mut e = seeded();
    let mut observed = vec![e.state().clone()];
    while e.state().phase != Phase::Completed {
        observed.push(e.tick().unwrap().clone());
    }
    let history = e.execution_history();
    assert_eq!(history.len(), observed.len());
    for (n, entry) in history.iter().enumerate() {
        assert_eq!(entry.tick, n as u64);
        assert_eq!(entry.state, observed[n]);
        assert!(entry.verify());
    }
}

#[test]
fn rewind_then_replay_reproduces_identical_states() {
    let mut e = seeded();
    run_to_completion(&mut e);
    let original = e.execution_history();
    let final_tick = e.state().tick;

    e.rewind_to_tick(3).unwrap();
    assert_eq!(e.state().tick, 3);
    assert_eq!(e.history().last_tick(), Some(3));

    while e.state().tick < final_tick {
        e.tick().unwrap();
    }
    let replayed = e.execution_history();
    assert_eq!(replayed.len(), original.len());
    for (a, b) in original.iter().zip(replayed.iter()) {
        assert_eq!(a.digest, b.digest, "digest diverged at tick {}", a.tick);
        assert_eq!(a.state.queues, b.state.queues);
        assert_eq!(a.state.phase, b.state.phase);
    }
}

#[test]
fn rewind_truncates_events_to_that_tick() {
    let mut e = seeded();
    e.tick().unwrap();
    let cursor = e.history().get(1).unwrap().event_cursor;
    run_to_completion(&mut e);
    assert!(e.events().len() > cursor);

    e.rewind_to_tick(1).unwrap();
    assert_eq!(e.events().len(), cursor);
    assert_eq!(e.events().of_kind(EventKind::Completed).count(), 0);
}

#[test]
fn rewind_keeps_breakpoints_and_clears_running() {
    let mut e = seeded();
    e.set_running(true);
    e.tick().unwrap();
    e.tick().unwrap();
    e.set_breakpoint(7);

    e.rewind_to_tick(1).unwrap();
    assert!(e.state().breakpoints.contains(&7));
    assert!(!e.state().is_running);
}

#[test]
fn rewind_into_the_future_is_unavailable() {
    let mut e = seeded();
    e.tick().unwrap();
    assert_eq!(
        e.rewind_to_tick(5).unwrap_err(),
        EngineError::HistoryUnavailable { tick: 5 }
    );
    assert_eq!(e.state().tick, 1);
}

#[test]
fn keep_recent_window_limits_rewind_range() {
    let mut e = EventLoopEngine::with_retention(
        EngineLimits::default(),
        RetentionPolicy::KeepRecent { window: 2 },
    );
    e.enqueue_macrotask(TaskSpec::new("a"), 0).unwrap();
    e.enqueue_macrotask(TaskSpec::new("b"), 0).unwrap();
    run_to_completion(&mut e);
    let last = e.state().tick;

    assert_eq!(e.history().len(), 2);
    assert!(e.rewind_to_tick(last - 1).is_ok());
    assert_eq!(
        e.rewind_to_tick(0).unwrap_err(),
        EngineError::HistoryUnavailable { tick: 0 }
    );
}

#[test]
fn capture_and_restore_round_trip_timeline() {
    let mut e = seeded();
    e.tick().unwrap();
    e.tick().unwrap();
    let capture = e.capture();
    let digest = e.state().digest();

    run_to_completion(&mut e);
    e.restore(capture);
    assert_eq!(e.state().digest(), digest);
    assert_eq!(e.history().last_tick(), Some(2));
    assert!(e.rewind_to_tick(1).is_ok());
}
