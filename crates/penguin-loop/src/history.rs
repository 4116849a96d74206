// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Tick-indexed execution history and its retention policy.
//!
//! Entry `n` is the engine state observed immediately after tick `n`
//! committed (entry 0 is the state at reset). Entries are immutable and shared
//! via [`Arc`], so callers holding older reads keep a valid view after the
//! history is truncated or replaced.
//!
//! Retention controls memory use on long runs:
//!
//! - [`RetentionPolicy::KeepAll`] keeps every entry.
//! - [`RetentionPolicy::KeepRecent`] keeps a sliding window of the most recent
//!   entries; rewinding past the window reports the tick as unavailable.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::state::{EngineState, Hash};

/// Retention policy for execution history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "kebab-case"))]
pub enum RetentionPolicy {
    /// Keep all history indefinitely.
    #[default]
    KeepAll,
    /// Keep only the most recent `window` entries (minimum 1).
    KeepRecent {
        /// Number of entries kept.
        window: usize,
    },
}

/// One committed tick.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistoryEntry {
    /// Tick this entry was recorded at.
    pub tick: u64,
    /// Full engine state after the tick.
    pub state: EngineState,
    /// Digest of `state` at record time; verified on rewind.
    pub digest: Hash,
    /// Event-log length at record time.
    pub event_cursor: usize,
}

impl HistoryEntry {
    /// Records `state`, computing its digest.
    #[must_use]
    pub fn record(state: EngineState, event_cursor: usize) -> Self {
        let digest = state.digest();
        Self {
            tick: state.tick,
            state,
            digest,
            event_cursor,
        }
    }

    /// Re-computes the digest and compares it with the recorded one.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.state.digest() == self.digest && self.state.tick == self.tick
    }
}

/// Ordered, contiguous run of history entries.
#[derive(Clone, Debug, Default)]
pub struct ExecutionHistory {
    entries: VecDeque<Arc<HistoryEntry>>,
    policy: RetentionPolicy,
}

impl ExecutionHistory {
    /// Empty history with the given policy.
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            entries: VecDeque::new(),
            policy,
        }
    }

    /// Active retention policy.
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Appends an entry, pruning the oldest entries outside the window.
    pub fn push(&mut self, entry: HistoryEntry) {
        debug_assert!(
            self.last_tick().is_none_or(|t| t + 1 == entry.tick),
            "history must stay contiguous"
        );
        self.entries.push_back(Arc::new(entry));
        if let RetentionPolicy::KeepRecent { window } = self.policy {
            while self.entries.len() > window.max(1) {
                self.entries.pop_front();
            }
        }
    }

    /// Replaces the newest entry with a re-recording of the same tick.
    pub fn replace_last(&mut self, entry: HistoryEntry) {
        debug_assert!(
            self.last_tick() == Some(entry.tick),
            "replace_last must target the newest tick"
        );
        if let Some(last) = self.entries.back_mut() {
            *last = Arc::new(entry);
        }
    }

    /// Entry recorded at `tick`, if retained.
    pub fn get(&self, tick: u64) -> Option<&Arc<HistoryEntry>> {
        let first = self.first_tick()?;
        let offset = usize::try_from(tick.checked_sub(first)?).ok()?;
        self.entries.get(offset)
    }

    /// Drops every entry after `tick`.
    pub fn truncate_after(&mut self, tick: u64) {
        while self.entries.back().is_some_and(|e| e.tick > tick) {
            self.entries.pop_back();
        }
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest retained tick.
    pub fn first_tick(&self) -> Option<u64> {
        self.entries.front().map(|e| e.tick)
    }

    /// Newest retained tick.
    pub fn last_tick(&self) -> Option<u64> {
        self.entries.back().map(|e| e.tick)
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the retained entries in tick order. Entries are shared, never
    /// mutated.
    pub fn entries(&self) -> Vec<Arc<HistoryEntry>> {
        self.entries.iter().cloned().collect()
    }

    /// Entries with `from <= tick <= to`.
    pub fn range(&self, from: u64, to: u64) -> Vec<Arc<HistoryEntry>> {
        self.entries
            .iter()
            .filter(|e| e.tick >= from && e.tick <= to)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EngineLimits;

    fn entry(tick: u64) -> HistoryEntry {
        let mut state = EngineState::initial(EngineLimits::default());
        state.tick = tick;
        HistoryEntry::record(state, 0)
    }

    #[test]
    fn keep_recent_prunes_oldest() {
        let mut h = ExecutionHistory::new(RetentionPolicy::KeepRecent { window: 3 });
        for t in 0..6 {
            h.push(entry(t));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.first_tick(), Some(3));
        assert!(h.get(2).is_none());
        assert_eq!(h.get(4).map(|e| e.tick), Some(4));
    }

    #[test]
    fn truncate_after_drops_later_ticks() {
        let mut h = ExecutionHistory::default();
        for t in 0..5 {
            h.push(entry(t));
        }
        h.truncate_after(2);
        assert_eq!(h.last_tick(), Some(2));
        assert_eq!(h.range(1, 10).len(), 2);
    }

    #[test]
    fn tampered_entry_fails_verification() {
        let mut e = entry(0);
        assert!(e.verify());
        e.state.stats.total_executed = 99;
        assert!(!e.verify());
    }
}
