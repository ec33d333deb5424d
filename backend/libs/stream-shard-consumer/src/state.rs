//! Per-shard progress records and the registry that tracks them.
//!
//! A [`ShardState`] is written by exactly one consumption task and read by the
//! orchestrator when it checkpoints. The whole position is replaced under one
//! lock acquisition, so a reader sees either the old or the new value, never a
//! torn one.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{SequencePosition, ShardHandle};

/// Consistent copy of a shard's progress, suitable for checkpointing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSnapshot {
    pub shard: Arc<ShardHandle>,
    pub position: SequencePosition,
}

/// Shared progress cell for one shard.
///
/// Cloning shares the cell. Only this crate's consumer advances it.
#[derive(Debug, Clone)]
pub struct ShardState {
    shard: Arc<ShardHandle>,
    position: Arc<RwLock<SequencePosition>>,
}

impl ShardState {
    /// Start tracking a shard from a last processed (exclusive) position
    pub fn new(shard: ShardHandle, start: SequencePosition) -> Self {
        Self::from_arc(Arc::new(shard), start)
    }

    pub fn from_arc(shard: Arc<ShardHandle>, start: SequencePosition) -> Self {
        Self {
            shard,
            position: Arc::new(RwLock::new(start)),
        }
    }

    pub fn shard(&self) -> &Arc<ShardHandle> {
        &self.shard
    }

    pub fn position(&self) -> SequencePosition {
        self.position.read().clone()
    }

    pub fn snapshot(&self) -> ShardSnapshot {
        ShardSnapshot {
            shard: Arc::clone(&self.shard),
            position: self.position(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.position.read().is_shard_end()
    }

    /// Publish a new last processed position.
    ///
    /// Refuses to move backwards or away from `ShardEnd`; returns whether the
    /// position was accepted.
    pub(crate) fn advance(&self, next: SequencePosition) -> bool {
        let mut current = self.position.write();
        if !current.can_advance_to(&next) {
            warn!(
                shard = %self.shard,
                current = %*current,
                rejected = %next,
                "Refusing non-monotonic shard state update"
            );
            return false;
        }
        *current = next;
        true
    }

    pub(crate) fn mark_shard_end(&self) -> bool {
        self.advance(SequencePosition::ShardEnd)
    }
}

/// Append-only set of tracked shards.
///
/// Discovery appends to it while consumers run; the orchestrator reads
/// snapshots for checkpoints and last-seen shard ids for the next discovery
/// round.
#[derive(Debug, Default)]
pub struct ShardRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    states: Vec<ShardState>,
    /// (stream, shard id) -> index into `states`
    index: HashMap<(String, String), usize>,
    last_seen: HashMap<String, String>,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a shard. Returns `None` if it is already registered.
    pub fn register(&self, shard: ShardHandle, start: SequencePosition) -> Option<ShardState> {
        let key = (shard.stream.clone(), shard.shard_id.clone());
        let mut inner = self.inner.write();
        if inner.index.contains_key(&key) {
            debug!(stream = %key.0, shard_id = %key.1, "Shard already registered");
            return None;
        }

        let state = ShardState::new(shard, start);
        let idx = inner.states.len();
        inner.states.push(state.clone());
        inner.index.insert(key.clone(), idx);
        inner.last_seen.insert(key.0, key.1);
        Some(state)
    }

    /// Register a batch of discovered shards, returning only the new states
    pub fn register_discovered(
        &self,
        shards: impl IntoIterator<Item = ShardHandle>,
        start: &SequencePosition,
    ) -> Vec<ShardState> {
        shards
            .into_iter()
            .filter_map(|shard| self.register(shard, start.clone()))
            .collect()
    }

    pub fn get(&self, stream: &str, shard_id: &str) -> Option<ShardState> {
        let inner = self.inner.read();
        inner
            .index
            .get(&(stream.to_string(), shard_id.to_string()))
            .map(|&idx| inner.states[idx].clone())
    }

    /// Checkpoint view of every tracked shard, in registration order
    pub fn snapshots(&self) -> Vec<ShardSnapshot> {
        self.inner.read().states.iter().map(ShardState::snapshot).collect()
    }

    /// Most recently registered shard id per stream, used as the exclusive
    /// pagination start of the next discovery round
    pub fn last_seen_shard_ids(&self) -> HashMap<String, String> {
        self.inner.read().last_seen.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
