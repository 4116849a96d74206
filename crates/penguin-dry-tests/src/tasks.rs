// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Short constructors for task specs, one per originating source.

use penguin_loop::{TaskSource, TaskSpec};

/// Synchronous function call.
pub fn sync_fn(name: &str) -> TaskSpec {
    TaskSpec::new(name).with_source(TaskSource::SyncCall)
}

/// Promise reaction (`.then` callback).
pub fn promise(name: &str) -> TaskSpec {
    TaskSpec::new(name).with_source(TaskSource::Promise)
}

/// `queueMicrotask` callback.
pub fn queued(name: &str) -> TaskSpec {
    TaskSpec::new(name).with_source(TaskSource::QueueMicrotask)
}

/// Timer callback (`setTimeout`/`setInterval`).
pub fn timer(name: &str) -> TaskSpec {
    TaskSpec::new(name).with_source(TaskSource::Timer)
}

/// I/O completion callback.
pub fn io_callback(name: &str) -> TaskSpec {
    TaskSpec::new(name).with_source(TaskSource::Io)
}

/// DOM/event handler.
pub fn event_handler(name: &str) -> TaskSpec {
    TaskSpec::new(name).with_source(TaskSource::Event)
}
