// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Service façade tests: dispatch, queries and caching, snapshots, health and
//! the command log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use penguin_cqrs::{
    Command, CommandContext, CommandErrorKind, CqrsService, HealthStatus, Query, QueryData,
    ServiceConfig, StepOutcome,
};
use penguin_dry_tests::{promise, sync_fn, timer, CallbackRecorder, Scenario};
use penguin_loop::{EngineLimits, EventKind, Phase, TaskSpec};

fn service() -> CqrsService {
    CqrsService::new(ServiceConfig::default())
}

fn tick_until_complete(svc: &mut CqrsService) {
    for _ in 0..1000 {
        if svc.state().phase == Phase::Completed {
            return;
        }
        assert!(svc.dispatch(Command::Tick).success);
    }
    panic!("service never completed");
}

#[test]
fn main_push_pop_scenario() {
    let mut svc = service();
    let results = Scenario::main_push_pop().apply(&mut svc);
    assert!(results.iter().all(|r| r.success));

    let after_first_tick = results[1].state.as_ref().unwrap();
    assert_eq!(after_first_tick.phase, Phase::Executing);
    assert_eq!(after_first_tick.queues.call_stack.names(), vec!["main"]);

    let last = results[3].state.as_ref().unwrap();
    assert_eq!(last.phase, Phase::MicrotaskDrain);
    assert!(last.queues.call_stack.is_empty());
}

#[test]
fn promise_reactions_run_before_timers() {
    let mut svc = service();
    Scenario::promise_vs_timeout().apply(&mut svc);
    tick_until_complete(&mut svc);

    let executed: Vec<String> = svc
        .engine()
        .events()
        .as_slice()
        .iter()
        .filter(|e| matches!(e.kind, EventKind::FrameExecuted | EventKind::MicrotaskExecuted))
        .map(|e| e.detail.clone())
        .collect();
    assert_eq!(executed, vec!["script", "then1", "then2", "timeout"]);
}

#[test]
fn validation_failures_leave_state_untouched() {
    let mut svc = service();
    let before = svc.state();
    let result = svc.dispatch(Command::EnqueueMacrotask {
        task: timer("late"),
        delay: 3_000_000_000,
    });
    assert!(!result.success);
    assert_eq!(result.error, Some(CommandErrorKind::Validation));
    assert!(result.state.is_none());
    assert!(Arc::ptr_eq(&before, &svc.state()));
}

#[test]
fn full_stack_push_reports_capacity() {
    let mut svc = CqrsService::new(ServiceConfig::default().max_call_stack_size(2));
    for name in ["a", "b"] {
        assert!(svc.dispatch(Command::PushFunction { task: sync_fn(name) }).success);
    }
    let result = svc.dispatch(Command::PushFunction { task: sync_fn("c") });
    assert_eq!(result.error, Some(CommandErrorKind::Capacity));
    assert_eq!(svc.state().queues.call_stack.len(), 2);
}

#[test]
fn rewind_restores_recorded_tick() {
    let mut svc = service();
    Scenario::promise_vs_timeout().apply(&mut svc);
    svc.dispatch(Command::Tick);
    svc.dispatch(Command::Tick);
    let at_two = svc.state();
    tick_until_complete(&mut svc);

    assert!(svc.dispatch(Command::Rewind { tick: 2 }).success);
    assert_eq!(svc.state().digest(), at_two.digest());

    let missing = svc.dispatch(Command::Rewind { tick: 99 });
    assert_eq!(missing.error, Some(CommandErrorKind::NotFound));
}

#[test]
fn snapshots_survive_rewind_and_restore_exactly() {
    let mut svc = service();
    Scenario::timer_burst(3).apply(&mut svc);
    svc.dispatch(Command::Tick);
    assert!(svc
        .dispatch(Command::CreateSnapshot {
            name: "before-timers".into()
        })
        .success);
    let digest = svc.state().digest();

    tick_until_complete(&mut svc);
    svc.dispatch(Command::Rewind { tick: 0 });
    assert_eq!(svc.snapshots().len(), 1);

    assert!(svc
        .dispatch(Command::RestoreSnapshot {
            name: "before-timers".into()
        })
        .success);
    assert_eq!(svc.state().digest(), digest);
    assert_eq!(svc.state().tick, 1);

    let gone = svc.dispatch(Command::RestoreSnapshot {
        name: "nope".into(),
    });
    assert_eq!(gone.error, Some(CommandErrorKind::NotFound));

    assert!(svc
        .dispatch(Command::DeleteSnapshot {
            name: "before-timers".into()
        })
        .success);
    assert!(svc.snapshots().is_empty());
}

#[test]
fn reset_clears_history_and_snapshots() {
    let mut svc = service();
    svc.dispatch(Command::Tick);
    svc.dispatch(Command::CreateSnapshot { name: "s".into() });
    assert!(svc.dispatch(Command::Reset).success);
    assert_eq!(svc.state().tick, 0);
    assert_eq!(svc.engine().history().len(), 1);
    assert!(svc.snapshots().is_empty());
}

#[test]
fn queries_are_cached_until_the_next_successful_command() {
    let mut svc = service();
    svc.dispatch(Command::PushFunction { task: sync_fn("main") });

    let first = svc.ask(&Query::CallStack).unwrap();
    let second = svc.ask(&Query::CallStack).unwrap();
    assert!(!first.cached);
    assert!(second.cached);
    assert!(Arc::ptr_eq(&first.data, &second.data));

    // A failed command does not invalidate.
    svc.dispatch(Command::Rewind { tick: 50 });
    assert!(svc.ask(&Query::CallStack).unwrap().cached);

    svc.dispatch(Command::SetBreakpoint { tick: 4 });
    assert!(!svc.ask(&Query::CallStack).unwrap().cached);
    assert!(svc.cache_stats().generation >= 2);
}

#[test]
fn run_loop_auto_stop_is_not_answered_from_the_cache() {
    let mut svc = service();
    svc.dispatch(Command::Start);
    let before = svc.ask(&Query::CurrentState).unwrap();
    let QueryData::State(before) = &*before.data else {
        panic!("expected state");
    };
    assert!(before.is_running);

    assert_eq!(svc.step().unwrap(), StepOutcome::Exhausted);
    let after = svc.ask(&Query::CurrentState).unwrap();
    assert!(!after.cached);
    let QueryData::State(after) = &*after.data else {
        panic!("expected state");
    };
    assert!(!after.is_running);
    assert_eq!(after.tick, before.tick);
    assert!(Arc::ptr_eq(after, &svc.state()));
}

#[test]
fn drive_budget_stop_is_not_answered_from_the_cache() {
    let mut svc = service();
    Scenario::promise_vs_timeout().apply(&mut svc);
    svc.dispatch(Command::Start);
    let summary = svc.drive(1).unwrap();
    assert_eq!(summary.ticks, 1);

    let result = svc.ask(&Query::CurrentState).unwrap();
    assert!(!result.cached);
    let QueryData::State(state) = &*result.data else {
        panic!("expected state");
    };
    assert!(!state.is_running);
    assert_eq!(state.tick, 1);
    assert_eq!(state.digest(), svc.state().digest());
}

#[test]
fn command_log_is_never_served_stale() {
    let mut svc = service();
    svc.dispatch(Command::Tick);
    let a = svc.ask(&Query::CommandLog { limit: 10 }).unwrap();
    svc.dispatch(Command::PopFunction);
    let b = svc.ask(&Query::CommandLog { limit: 10 }).unwrap();
    assert!(!b.cached);
    let (QueryData::CommandLog(a), QueryData::CommandLog(b)) = (&*a.data, &*b.data) else {
        panic!("expected command logs");
    };
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 2);
    assert!(!b[1].success);
    assert_eq!(b[1].error, Some(CommandErrorKind::InvalidState));
}

#[test]
fn command_log_records_context() {
    let mut svc = service();
    svc.dispatch_with(
        Command::SetBreakpoint { tick: 3 },
        CommandContext {
            timestamp_ms: 1_700_000_000_000,
            caller: Some("lesson-3".into()),
        },
    );
    let entry = &svc.command_log().latest(1)[0];
    assert_eq!(entry.kind, "set-breakpoint");
    assert_eq!(entry.timestamp_ms, 1_700_000_000_000);
    assert_eq!(entry.caller.as_deref(), Some("lesson-3"));
    assert_eq!(entry.payload["tick"], 3);
}

#[test]
fn history_query_honours_range() {
    let mut svc = service();
    Scenario::promise_vs_timeout().apply(&mut svc);
    tick_until_complete(&mut svc);
    let result = svc
        .ask(&Query::ExecutionHistory {
            from: Some(2),
            to: Some(4),
        })
        .unwrap();
    let QueryData::History(entries) = &*result.data else {
        panic!("expected history");
    };
    let ticks: Vec<u64> = entries.iter().map(|e| e.tick).collect();
    assert_eq!(ticks, vec![2, 3, 4]);

    assert!(svc
        .ask(&Query::ExecutionHistory {
            from: Some(4),
            to: Some(2),
        })
        .is_err());
}

#[test]
fn events_query_filters_by_kind() {
    let mut svc = service();
    Scenario::timer_burst(2).apply(&mut svc);
    tick_until_complete(&mut svc);
    let result = svc
        .ask(&Query::EventsByType {
            kind: EventKind::MacrotaskPicked,
        })
        .unwrap();
    let QueryData::Events(events) = &*result.data else {
        panic!("expected events");
    };
    // Shorter delay first: timer-1 has delay 10, timer-0 has delay 20.
    let names: Vec<&str> = events.iter().map(|e| e.detail.as_str()).collect();
    assert_eq!(names, vec!["timer-1", "timer-0"]);
}

#[test]
fn health_tracks_pressure_and_errors() {
    let mut svc = CqrsService::new(ServiceConfig::default().max_microtask_queue_size(5));
    let health = |svc: &mut CqrsService| match &*svc.ask(&Query::Health).unwrap().data {
        QueryData::Health(h) => h.status,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(health(&mut svc), HealthStatus::Healthy);
    Scenario::microtask_flood(4).apply(&mut svc);
    assert_eq!(health(&mut svc), HealthStatus::Degraded);
    Scenario::microtask_flood(1).apply(&mut svc);
    assert_eq!(health(&mut svc), HealthStatus::Critical);
}

#[test]
fn metrics_report_counters() {
    let mut svc = service();
    Scenario::promise_chain(3).apply(&mut svc);
    tick_until_complete(&mut svc);
    let result = svc.ask(&Query::PerformanceMetrics).unwrap();
    let QueryData::Metrics(m) = &*result.data else {
        panic!("expected metrics");
    };
    assert_eq!(m.total_executed, 3);
    assert_eq!(m.error_count, 0);
    assert_eq!(m.ticks_measured, m.tick);
    assert!(!result.cached);
}

#[test]
fn subscribers_receive_each_published_state() {
    let mut svc = service();
    let last = Arc::new(AtomicU64::new(u64::MAX));
    let sink = Arc::clone(&last);
    let handle = svc.subscribe(move |state| sink.store(state.tick, Ordering::SeqCst));

    svc.dispatch(Command::Tick);
    svc.dispatch(Command::Tick);
    assert_eq!(last.load(Ordering::SeqCst), 2);

    assert!(handle.unsubscribe());
    svc.dispatch(Command::Tick);
    assert_eq!(last.load(Ordering::SeqCst), 2);
}

#[test]
fn completion_callback_fires_once_per_completion() {
    let recorder = CallbackRecorder::new();
    let mut svc = CqrsService::new(recorder.config(EngineLimits::default()));
    svc.dispatch(Command::EnqueueMacrotask {
        task: timer("t"),
        delay: 0,
    });
    tick_until_complete(&mut svc);
    svc.dispatch(Command::Tick); // no-op on a completed engine
    assert_eq!(recorder.completions().len(), 1);

    // Extending a finished simulation re-opens it; finishing again reports again.
    svc.dispatch(Command::EnqueueMicrotask {
        task: promise("late"),
        priority: Default::default(),
    });
    assert_eq!(svc.state().phase, Phase::Idle);
    tick_until_complete(&mut svc);
    assert_eq!(recorder.completions().len(), 2);
    assert!(recorder.errors().is_empty());
}

#[test]
fn breakpoint_pauses_synchronous_drive_at_tick_three() {
    let mut svc = service();
    Scenario::promise_vs_timeout().apply(&mut svc);
    svc.dispatch(Command::SetBreakpoint { tick: 3 });
    svc.dispatch(Command::Start);

    let summary = svc.drive(100).unwrap();
    assert_eq!(summary.outcome, StepOutcome::Breakpoint { tick: 3 });
    assert_eq!(summary.ticks, 3);
    assert!(svc.state().is_paused);
    assert_eq!(svc.step().unwrap(), StepOutcome::Paused);
    assert_eq!(svc.state().tick, 3);

    svc.dispatch(Command::Resume);
    let summary = svc.drive(100).unwrap();
    assert!(matches!(summary.outcome, StepOutcome::Completed { .. }));
    assert!(!svc.state().is_running);
}

#[test]
fn deep_nesting_is_rejected() {
    let mut spec = TaskSpec::new("leaf");
    for i in 0..20 {
        spec = TaskSpec::new(format!("n{i}")).then_microtask(spec);
    }
    let mut svc = service();
    let result = svc.dispatch(Command::PushFunction { task: spec });
    assert_eq!(result.error, Some(CommandErrorKind::Validation));
}
