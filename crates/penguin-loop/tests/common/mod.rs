// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code, clippy::expect_used, clippy::panic)]

use penguin_loop::{EngineLimits, EventKind, EventLoopEngine, Phase};

/// Upper bound on ticks any test scenario needs.
pub const MAX_TICKS: usize = 10_000;

/// Engine with default limits.
pub fn engine() -> EventLoopEngine {
    EventLoopEngine::new(EngineLimits::default())
}

/// Ticks until the engine reports `completed`; returns the number of ticks taken.
pub fn run_to_completion(engine: &mut EventLoopEngine) -> usize {
    for n in 0..MAX_TICKS {
        if engine.state().phase == Phase::Completed {
            return n;
        }
        engine.tick().expect("tick");
    }
    panic!("engine did not complete within {MAX_TICKS} ticks");
}

/// Ticks until the engine reaches `phase`.
pub fn tick_until(engine: &mut EventLoopEngine, phase: Phase) {
    for _ in 0..MAX_TICKS {
        if engine.state().phase == phase {
            return;
        }
        engine.tick().expect("tick");
    }
    panic!("engine never reached {phase}");
}

/// Names attached to events of `kind`, in log order.
pub fn event_names(engine: &EventLoopEngine, kind: EventKind) -> Vec<String> {
    engine
        .events()
        .of_kind(kind)
        .map(|e| e.detail.clone())
        .collect()
}
