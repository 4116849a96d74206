// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Named engine captures, kept apart from the tick timeline.
//!
//! Rewinding never touches this store; only `reset` clears it.

use std::collections::BTreeMap;
use std::sync::Arc;

use penguin_loop::EngineCapture;
use serde::{Deserialize, Serialize};

/// A captured engine under a name.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Name the snapshot was created under.
    pub name: String,
    /// Captured state, history and events.
    pub capture: EngineCapture,
}

impl Snapshot {
    /// Summary for listings.
    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            name: self.name.clone(),
            tick: self.capture.state.tick,
            phase: self.capture.state.phase,
            digest: self.capture.state.digest_hex(),
            history_len: self.capture.history.len(),
        }
    }
}

/// Listing entry for a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Snapshot name.
    pub name: String,
    /// Tick at capture time.
    pub tick: u64,
    /// Phase at capture time.
    pub phase: penguin_loop::Phase,
    /// Hex state digest at capture time.
    pub digest: String,
    /// History entries captured.
    pub history_len: usize,
}

/// Snapshots keyed by name, listed in name order.
#[derive(Clone, Debug, Default)]
pub struct SnapshotStore {
    snapshots: BTreeMap<String, Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `capture` under `name`, replacing any previous snapshot with that
    /// name. Returns the replaced snapshot.
    pub fn insert(&mut self, name: &str, capture: EngineCapture) -> Option<Arc<Snapshot>> {
        let snapshot = Snapshot {
            name: name.to_owned(),
            capture,
        };
        self.snapshots.insert(name.to_owned(), Arc::new(snapshot))
    }

    /// Snapshot called `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.get(name).cloned()
    }

    /// Removes the snapshot called `name`.
    pub fn remove(&mut self, name: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.remove(name)
    }

    /// Summaries of every snapshot.
    pub fn list(&self) -> Vec<SnapshotInfo> {
        self.snapshots.values().map(|s| s.info()).collect()
    }

    /// Drops every snapshot.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
