// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canned command sequences used across the test suites.

use penguin_cqrs::{Command, CommandResult, CqrsService};
use penguin_loop::{Priority, TaskSpec};

use crate::tasks::{promise, sync_fn, timer};

/// A named list of commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scenario {
    /// Label used in assertion messages.
    pub name: &'static str,
    /// Commands, in dispatch order.
    pub commands: Vec<Command>,
}

impl Scenario {
    /// Dispatches every command, returning the results in order.
    pub fn apply(&self, service: &mut CqrsService) -> Vec<CommandResult> {
        self.commands
            .iter()
            .cloned()
            .map(|cmd| service.dispatch(cmd))
            .collect()
    }

    /// Appends `command`.
    pub fn then(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// `main` pushed, ticked into `executing`, popped, ticked into the drain.
    pub fn main_push_pop() -> Self {
        Self {
            name: "main-push-pop",
            commands: vec![
                Command::PushFunction {
                    task: sync_fn("main"),
                },
                Command::Tick,
                Command::PopFunction,
                Command::Tick,
            ],
        }
    }

    /// Classic ordering puzzle:
    ///
    /// ```text
    /// setTimeout(timeout, 0);
    /// Promise.resolve().then(then1).then(then2);
    /// ```
    ///
    /// expressed as a `script` frame with follow-ups. Expected execution
    /// order: `script`, `then1`, `then2`, `timeout`.
    pub fn promise_vs_timeout() -> Self {
        let script = sync_fn("script")
            .then_macrotask(timer("timeout"), 0)
            .then_microtask(promise("then1").then_microtask(promise("then2")));
        Self {
            name: "promise-vs-timeout",
            commands: vec![Command::PushFunction { task: script }],
        }
    }

    /// A promise chain `depth` reactions long, started from one microtask.
    pub fn promise_chain(depth: usize) -> Self {
        let mut spec = promise(&format!("then{}", depth.max(1)));
        for i in (1..depth.max(1)).rev() {
            spec = promise(&format!("then{i}")).then_microtask(spec);
        }
        Self {
            name: "promise-chain",
            commands: vec![Command::EnqueueMicrotask {
                task: spec,
                priority: Priority::Normal,
            }],
        }
    }

    /// `count` timers with descending delays, enqueued directly.
    pub fn timer_burst(count: u64) -> Self {
        Self {
            name: "timer-burst",
            commands: (0..count)
                .map(|i| Command::EnqueueMacrotask {
                    task: timer(&format!("timer-{i}")),
                    delay: (count - i) * 10,
                })
                .collect(),
        }
    }

    /// `count` microtasks enqueued directly.
    pub fn microtask_flood(count: usize) -> Self {
        Self {
            name: "microtask-flood",
            commands: (0..count)
                .map(|i| Command::EnqueueMicrotask {
                    task: TaskSpec::new(format!("micro-{i}")),
                    priority: Priority::Normal,
                })
                .collect(),
        }
    }
}
