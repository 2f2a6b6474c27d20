// src/core/registry.rs

//! A concurrent id-keyed map split into independently locked shards.
//!
//! The shard of an id is `id % shard_count`, so an id lives in exactly one
//! shard for its whole lifetime. Each shard is also the unit of work of one
//! keepalive sweeper, which is why shards are handed out as `Arc`s.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// One partition of the registry, guarded by a single reader/writer lock.
#[derive(Debug)]
pub struct Shard<V> {
    items: RwLock<HashMap<u64, V>>,
}

impl<V> Default for Shard<V> {
    fn default() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone> Shard<V> {
    pub fn get(&self, id: u64) -> Option<V> {
        self.items.read().get(&id).cloned()
    }

    /// Inserts `value` unless `id` is already present. The check and the
    /// insert happen under the same write lock.
    pub fn insert_new(&self, id: u64, value: V) -> bool {
        match self.items.write().entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn remove(&self, id: u64) -> Option<V> {
        self.items.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Visits every entry while holding the read lock for the whole scan.
    /// `f` must not call back into this shard's write path.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(u64, &V),
    {
        let items = self.items.read();
        for (id, value) in items.iter() {
            f(*id, value);
        }
    }

    /// Snapshot of all values in the shard.
    pub fn values(&self) -> Vec<V> {
        self.items.read().values().cloned().collect()
    }
}

/// The full registry: a fixed array of shards.
#[derive(Debug)]
pub struct ShardedRegistry<V> {
    shards: Box<[Arc<Shard<V>>]>,
}

impl<V: Clone> ShardedRegistry<V> {
    /// Creates a registry with `shard_count` shards (at least one).
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Arc::new(Shard::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_index(&self, id: u64) -> usize {
        (id % self.shards.len() as u64) as usize
    }

    pub fn shard(&self, id: u64) -> &Arc<Shard<V>> {
        &self.shards[self.shard_index(id)]
    }

    pub fn shards(&self) -> &[Arc<Shard<V>>] {
        &self.shards
    }

    pub fn get(&self, id: u64) -> Option<V> {
        self.shard(id).get(id)
    }

    /// Returns false (and drops nothing) if `id` is already registered.
    pub fn insert_new(&self, id: u64, value: V) -> bool {
        self.shard(id).insert_new(id, value)
    }

    pub fn remove(&self, id: u64) -> Option<V> {
        self.shard(id).remove(id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.shard(id).items.read().contains_key(&id)
    }

    /// Total number of entries. Shards are locked one after another, so the
    /// result is only exact when no add/remove runs concurrently.
    pub fn count(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    /// Snapshot of every id currently registered.
    pub fn ids(&self) -> Vec<u64> {
        let mut ids = Vec::with_capacity(self.count());
        for shard in self.shards.iter() {
            shard.for_each(|id, _| ids.push(id));
        }
        ids
    }

    /// Snapshot of every value currently registered.
    pub fn values(&self) -> Vec<V> {
        self.shards.iter().flat_map(|shard| shard.values()).collect()
    }
}
