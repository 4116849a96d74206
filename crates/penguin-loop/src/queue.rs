// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! The three task containers and their structural rules.
//!
//! - [`CallStack`]: LIFO, bounded. A push at capacity is an overflow, never a
//!   silent truncation.
//! - [`MicrotaskQueue`]: FIFO with a high-priority lane that drains first.
//!   The capacity bound covers both lanes.
//! - [`MacrotaskQueue`]: ordered by `(delay, enqueue tick, insertion seq)`
//!   ascending. The insertion sequence is part of the queue state so that
//!   identical `(delay, tick)` pairs replay in the same order.
//!
//! Business-rule violations are returned as [`QueueError`] values. Nothing in
//! this module panics on full or empty containers.

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;

use crate::task::{Priority, Task, TaskId, TaskKind, TaskSource};

/// Default maximum call-stack depth.
pub const DEFAULT_MAX_CALL_STACK_SIZE: usize = 100;
/// Default microtask queue capacity (both lanes combined).
pub const DEFAULT_MAX_MICROTASK_QUEUE_SIZE: usize = 1000;
/// Default macrotask queue capacity.
pub const DEFAULT_MAX_MACROTASK_QUEUE_SIZE: usize = 1000;

/// Capacity bounds for the three containers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineLimits {
    /// Maximum number of frames on the call stack.
    pub max_call_stack_size: usize,
    /// Maximum number of pending microtasks.
    pub max_microtask_queue_size: usize,
    /// Maximum number of pending macrotasks.
    pub max_macrotask_queue_size: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_call_stack_size: DEFAULT_MAX_CALL_STACK_SIZE,
            max_microtask_queue_size: DEFAULT_MAX_MICROTASK_QUEUE_SIZE,
            max_macrotask_queue_size: DEFAULT_MAX_MACROTASK_QUEUE_SIZE,
        }
    }
}

/// Names the container a [`QueueError`] refers to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum QueueName {
    /// The call stack.
    CallStack,
    /// The microtask queue.
    Microtasks,
    /// The macrotask queue.
    Macrotasks,
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CallStack => "call stack",
            Self::Microtasks => "microtask queue",
            Self::Macrotasks => "macrotask queue",
        })
    }
}

/// Typed failures reported by the containers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Push attempted while the call stack is at capacity.
    #[error("maximum call stack size exceeded ({capacity} frames)")]
    CallStackOverflow {
        /// Configured maximum depth.
        capacity: usize,
    },
    /// Enqueue attempted while a queue is at capacity.
    #[error("{queue} is full ({capacity} tasks)")]
    QueueFull {
        /// The full queue.
        queue: QueueName,
        /// Configured capacity.
        capacity: usize,
    },
    /// Pop/dequeue attempted on an empty container.
    #[error("{queue} is empty")]
    Empty {
        /// The empty container.
        queue: QueueName,
    },
    /// A task of the wrong kind was offered to a queue.
    #[error("task {id} is a {actual}, {queue} only accepts {expected}")]
    KindMismatch {
        /// Offending task.
        id: TaskId,
        /// Container that rejected it.
        queue: QueueName,
        /// Kind the container accepts.
        expected: TaskKind,
        /// Kind the task actually has.
        actual: TaskKind,
    },
}

impl QueueError {
    /// True for overflow/full failures.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::CallStackOverflow { .. } | Self::QueueFull { .. })
    }
}

/// LIFO stack of executing frames.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallStack {
    frames: Vec<Task>,
    capacity: usize,
}

impl CallStack {
    /// Creates an empty stack with the given maximum depth.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Vec::new(),
            capacity,
        }
    }

    /// Pushes a frame. Any task kind may become a frame (picked macrotasks do).
    pub fn push(&mut self, frame: Task) -> Result<usize, QueueError> {
        if self.is_full() {
            return Err(QueueError::CallStackOverflow {
                capacity: self.capacity,
            });
        }
        self.frames.push(frame);
        Ok(self.frames.len())
    }

    /// Pops the top frame.
    pub fn pop(&mut self) -> Result<Task, QueueError> {
        self.frames.pop().ok_or(QueueError::Empty {
            queue: QueueName::CallStack,
        })
    }

    /// Top frame, if any.
    pub fn peek(&self) -> Option<&Task> {
        self.frames.last()
    }

    /// Current depth.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when no frames are present.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// True when a push would overflow.
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Maximum depth.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames from bottom (oldest) to top.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Task> + ExactSizeIterator {
        self.frames.iter()
    }

    /// Frame names from bottom to top.
    pub fn names(&self) -> Vec<String> {
        self.frames.iter().map(|t| t.name().to_owned()).collect()
    }
}

/// FIFO microtask queue with a high-priority lane.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MicrotaskQueue {
    high: VecDeque<Task>,
    normal: VecDeque<Task>,
    capacity: usize,
}

impl MicrotaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            high: VecDeque::new(),
            normal: VecDeque::new(),
            capacity,
        }
    }

    /// Enqueues a microtask into the lane matching its priority.
    pub fn enqueue(&mut self, task: Task) -> Result<usize, QueueError> {
        if task.kind() != TaskKind::Microtask {
            return Err(QueueError::KindMismatch {
                id: task.id(),
                queue: QueueName::Microtasks,
                expected: TaskKind::Microtask,
                actual: task.kind(),
            });
        }
        if self.is_full() {
            return Err(QueueError::QueueFull {
                queue: QueueName::Microtasks,
                capacity: self.capacity,
            });
        }
        match task.priority() {
            Priority::High => self.high.push_back(task),
            Priority::Normal => self.normal.push_back(task),
        }
        Ok(self.len())
    }

    /// Dequeues the next microtask; the high lane always goes first.
    pub fn dequeue(&mut self) -> Result<Task, QueueError> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .ok_or(QueueError::Empty {
                queue: QueueName::Microtasks,
            })
    }

    /// Next microtask to run, if any.
    pub fn peek(&self) -> Option<&Task> {
        self.high.front().or_else(|| self.normal.front())
    }

    /// Pending microtasks across both lanes.
    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    /// Pending high-priority microtasks.
    pub fn high_len(&self) -> usize {
        self.high.len()
    }

    /// Pending normal-priority microtasks.
    pub fn normal_len(&self) -> usize {
        self.normal.len()
    }

    /// True when both lanes are empty.
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }

    /// True when an enqueue would fail.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pending microtasks in drain order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.high.iter().chain(self.normal.iter())
    }
}

/// Ordering key of a pending macrotask.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacrotaskKey {
    /// Timer delay in milliseconds.
    pub delay: u64,
    /// Tick at which the macrotask was enqueued.
    pub enqueued_tick: u64,
    /// Insertion sequence; breaks `(delay, tick)` ties.
    pub seq: u64,
}

#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct MacrotaskEntry {
    key: MacrotaskKey,
    task: Task,
}

/// Macrotask queue ordered by [`MacrotaskKey`].
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacrotaskQueue {
    entries: VecDeque<MacrotaskEntry>,
    next_seq: u64,
    capacity: usize,
}

impl MacrotaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 0,
            capacity,
        }
    }

    /// Inserts a macrotask at its ordered position.
    ///
    /// The enqueue tick is the task's creation tick; a missing delay sorts as 0.
    pub fn enqueue(&mut self, task: Task) -> Result<usize, QueueError> {
        if task.kind() != TaskKind::Macrotask {
            return Err(QueueError::KindMismatch {
                id: task.id(),
                queue: QueueName::Macrotasks,
                expected: TaskKind::Macrotask,
                actual: task.kind(),
            });
        }
        if self.is_full() {
            return Err(QueueError::QueueFull {
                queue: QueueName::Macrotasks,
                capacity: self.capacity,
            });
        }
        let key = MacrotaskKey {
            delay: task.delay().unwrap_or(0),
            enqueued_tick: task.created_tick(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let at = self.entries.partition_point(|e| e.key < key);
        self.entries.insert(at, MacrotaskEntry { key, task });
        Ok(self.entries.len())
    }

    /// Removes the earliest macrotask.
    pub fn dequeue(&mut self) -> Result<Task, QueueError> {
        self.entries
            .pop_front()
            .map(|e| e.task)
            .ok_or(QueueError::Empty {
                queue: QueueName::Macrotasks,
            })
    }

    /// Earliest macrotask, if any.
    pub fn peek(&self) -> Option<&Task> {
        self.entries.front().map(|e| &e.task)
    }

    /// Pending macrotasks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when an enqueue would fail.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Next insertion sequence number.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Pending macrotasks in pick order, with their keys.
    pub fn iter(&self) -> impl Iterator<Item = (&MacrotaskKey, &Task)> {
        self.entries.iter().map(|e| (&e.key, &e.task))
    }
}

/// One line of a stack trace, top of stack first.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StackTraceFrame {
    /// 0 for the top frame.
    pub depth: usize,
    /// Frame task id.
    pub id: TaskId,
    /// Frame name.
    pub name: String,
    /// Frame kind (picked macrotasks keep their kind).
    pub kind: TaskKind,
    /// Originating source.
    pub source: TaskSource,
}

impl fmt::Display for StackTraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {} ({})", self.name, self.source)
    }
}

/// Container occupancy summary.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueDebugInfo {
    /// Current call-stack depth.
    pub call_stack_depth: usize,
    /// Maximum call-stack depth.
    pub call_stack_capacity: usize,
    /// Pending high-priority microtasks.
    pub microtasks_high: usize,
    /// Pending normal-priority microtasks.
    pub microtasks_normal: usize,
    /// Microtask capacity.
    pub microtask_capacity: usize,
    /// Pending macrotasks.
    pub macrotasks: usize,
    /// Macrotask capacity.
    pub macrotask_capacity: usize,
    /// Name of the top frame.
    pub top_frame: Option<String>,
    /// Name of the next microtask.
    pub next_microtask: Option<String>,
    /// Name of the next macrotask.
    pub next_macrotask: Option<String>,
}

/// The three containers, owned together.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueSystem {
    /// LIFO call stack.
    pub call_stack: CallStack,
    /// Microtask queue.
    pub microtasks: MicrotaskQueue,
    /// Macrotask queue.
    pub macrotasks: MacrotaskQueue,
}

impl QueueSystem {
    /// Empty containers sized by `limits`.
    #[must_use]
    pub fn new(limits: EngineLimits) -> Self {
        Self {
            call_stack: CallStack::new(limits.max_call_stack_size),
            microtasks: MicrotaskQueue::new(limits.max_microtask_queue_size),
            macrotasks: MacrotaskQueue::new(limits.max_macrotask_queue_size),
        }
    }

    /// Pushes onto the call stack.
    pub fn push_call_stack(&mut self, frame: Task) -> Result<usize, QueueError> {
        self.call_stack.push(frame)
    }

    /// Pops the call stack.
    pub fn pop_call_stack(&mut self) -> Result<Task, QueueError> {
        self.call_stack.pop()
    }

    /// Enqueues a microtask.
    pub fn enqueue_microtask(&mut self, task: Task) -> Result<usize, QueueError> {
        self.microtasks.enqueue(task)
    }

    /// Dequeues the next microtask.
    pub fn dequeue_microtask(&mut self) -> Result<Task, QueueError> {
        self.microtasks.dequeue()
    }

    /// Enqueues a macrotask.
    pub fn enqueue_macrotask(&mut self, task: Task) -> Result<usize, QueueError> {
        self.macrotasks.enqueue(task)
    }

    /// Dequeues the earliest macrotask.
    pub fn dequeue_macrotask(&mut self) -> Result<Task, QueueError> {
        self.macrotasks.dequeue()
    }

    /// True when all three containers are empty.
    pub fn is_idle(&self) -> bool {
        self.call_stack.is_empty() && self.microtasks.is_empty() && self.macrotasks.is_empty()
    }

    /// Stack trace, top frame first.
    pub fn stack_trace(&self) -> Vec<StackTraceFrame> {
        self.call_stack
            .iter()
            .rev()
            .enumerate()
            .map(|(depth, t)| StackTraceFrame {
                depth,
                id: t.id(),
                name: t.name().to_owned(),
                kind: t.kind(),
                source: t.source(),
            })
            .collect()
    }

    /// Occupancy summary.
    pub fn debug_info(&self) -> QueueDebugInfo {
        QueueDebugInfo {
            call_stack_depth: self.call_stack.len(),
            call_stack_capacity: self.call_stack.capacity(),
            microtasks_high: self.microtasks.high_len(),
            microtasks_normal: self.microtasks.normal_len(),
            microtask_capacity: self.microtasks.capacity(),
            macrotasks: self.macrotasks.len(),
            macrotask_capacity: self.macrotasks.capacity(),
            top_frame: self.call_stack.peek().map(|t| t.name().to_owned()),
            next_microtask: self.microtasks.peek().map(|t| t.name().to_owned()),
            next_macrotask: self.macrotasks.peek().map(|t| t.name().to_owned()),
        }
    }
}
