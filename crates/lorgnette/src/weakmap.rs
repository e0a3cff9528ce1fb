//! Identity-keyed snapshot store that never extends the lifetime of a
//! traced object.
//!
//! The map holds `ObjKey` handles, not the objects themselves. When the
//! host observes an object's death it signals the map's `RemovalSink`;
//! the notification is staged and committed lazily by the next mutating
//! operation on the owning thread. The borrow checker plays the role of
//! the iteration guard: commits only happen through `&mut` operations,
//! which cannot overlap a live iterator.

use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lorgnette_types::{Identity, ObjKey};

/// The key has no stable identity (`Identity::Inline`) and cannot be held
/// by a weak identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeakKeyError;

impl fmt::Display for WeakKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value has no stable identity and cannot key a weak identity map")
    }
}

impl Error for WeakKeyError {}

// ── Removal staging ──────────────────────────────────────

struct SinkShared {
    staged: Mutex<Vec<ObjKey>>,
    generation: AtomicU64,
}

/// Cloneable endpoint for drop notifications. `retire` may be called from
/// any thread; it only stages the key and bumps a generation counter, it
/// never touches the backing store.
#[derive(Clone)]
pub struct RemovalSink {
    shared: Arc<SinkShared>,
}

impl RemovalSink {
    fn new() -> Self {
        Self {
            shared: Arc::new(SinkShared {
                staged: Mutex::new(Vec::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn retire(&self, key: ObjKey) {
        self.shared.staged.lock().push(key);
        self.shared.generation.fetch_add(1, Ordering::Release);
    }

    fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    fn drain(&self) -> Vec<ObjKey> {
        std::mem::take(&mut *self.shared.staged.lock())
    }
}

// ── The map ──────────────────────────────────────────────

pub struct WeakIdMap<V> {
    data: HashMap<ObjKey, V>,
    removals: RemovalSink,
    cached_len: Cell<usize>,
    len_generation: Cell<u64>,
}

impl<V> Default for WeakIdMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> WeakIdMap<V> {
    pub fn new() -> Self {
        let removals = RemovalSink::new();
        let len_generation = Cell::new(removals.generation());
        Self {
            data: HashMap::new(),
            removals,
            cached_len: Cell::new(0),
            len_generation,
        }
    }

    /// Endpoint the host (or an object arena) uses to report deaths.
    pub fn removal_sink(&self) -> RemovalSink {
        self.removals.clone()
    }

    /// Commits staged removals into the backing store.
    pub fn flush_pending(&mut self) {
        let generation = self.removals.generation();
        for key in self.removals.drain() {
            self.data.remove(&key);
        }
        self.cached_len.set(self.data.len());
        self.len_generation.set(generation);
    }

    /// Keys by identity; an `Inline` identity is not insertable.
    pub fn try_insert(&mut self, identity: Identity, value: V) -> Result<Option<V>, WeakKeyError> {
        let key = identity.key().ok_or(WeakKeyError)?;
        Ok(self.insert(key, value))
    }

    pub fn insert(&mut self, key: ObjKey, value: V) -> Option<V> {
        self.flush_pending();
        let previous = self.data.insert(key, value);
        self.cached_len.set(self.data.len());
        previous
    }

    /// May still observe an entry whose removal is staged but not yet
    /// committed; the window closes at the next mutating operation.
    pub fn get(&self, key: ObjKey) -> Option<&V> {
        self.data.get(&key)
    }

    pub fn get_mut(&mut self, key: ObjKey) -> Option<&mut V> {
        self.flush_pending();
        self.data.get_mut(&key)
    }

    pub fn remove(&mut self, key: ObjKey) -> Option<V> {
        self.flush_pending();
        let removed = self.data.remove(&key);
        self.cached_len.set(self.data.len());
        removed
    }

    pub fn contains_key(&self, key: ObjKey) -> bool {
        self.data.contains_key(&key)
    }

    /// Live count, net of staged removals. Served from a cache guarded by
    /// the removal generation so repeated queries between drop
    /// notifications cost nothing.
    pub fn len(&self) -> usize {
        let generation = self.removals.generation();
        if generation == self.len_generation.get() {
            return self.cached_len.get();
        }
        let staged = self.removals.shared.staged.lock();
        let dead: HashSet<ObjKey> = staged
            .iter()
            .copied()
            .filter(|key| self.data.contains_key(key))
            .collect();
        let live = self.data.len() - dead.len();
        drop(staged);
        self.cached_len.set(live);
        self.len_generation.set(generation);
        live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjKey, &V)> {
        self.data.iter().map(|(key, value)| (*key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = ObjKey> + '_ {
        self.data.keys().copied()
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (ObjKey, V)>) {
        self.flush_pending();
        self.data.extend(entries);
        self.cached_len.set(self.data.len());
    }

    pub fn clear(&mut self) {
        self.removals.drain();
        self.data.clear();
        self.flush_pending();
    }
}

impl<V: Clone> WeakIdMap<V> {
    /// Mapping algebra with plain maps: union, right side wins.
    pub fn merge_from(&mut self, other: &HashMap<ObjKey, V>) {
        self.extend(other.iter().map(|(key, value)| (*key, value.clone())));
    }

    /// Plain-map copy of the live entries.
    pub fn to_map(&self) -> HashMap<ObjKey, V> {
        self.data
            .iter()
            .map(|(key, value)| (*key, value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(value: u64) -> ObjKey {
        ObjKey::new(value).expect("non-zero key")
    }

    #[test]
    fn insert_get_remove_roundtrip() {
        let mut map = WeakIdMap::new();
        assert!(map.insert(key(1), "a").is_none());
        assert_eq!(map.insert(key(1), "b"), Some("a"));
        assert_eq!(map.get(key(1)), Some(&"b"));
        assert_eq!(map.remove(key(1)), Some("b"));
        assert!(map.get(key(1)).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn inline_identity_is_not_insertable() {
        let mut map = WeakIdMap::new();
        let err = map
            .try_insert(Identity::Inline, "x")
            .expect_err("inline keys must be rejected");
        assert_eq!(err, WeakKeyError);
        assert!(map.is_empty());
    }

    #[test]
    fn retired_keys_leave_len_before_flush_and_store_after() {
        let mut map = WeakIdMap::new();
        map.insert(key(1), 10);
        map.insert(key(2), 20);
        let sink = map.removal_sink();

        sink.retire(key(1));
        // Store untouched until the next housekeeping pass, but the count
        // already converges.
        assert_eq!(map.len(), 1);
        assert!(map.get(key(1)).is_some());

        map.flush_pending();
        assert_eq!(map.len(), 1);
        assert!(map.get(key(1)).is_none());
        assert_eq!(map.get(key(2)), Some(&20));
    }

    #[test]
    fn len_cache_survives_repeated_queries() {
        let mut map = WeakIdMap::new();
        map.insert(key(1), ());
        map.insert(key(2), ());
        let sink = map.removal_sink();
        sink.retire(key(2));
        assert_eq!(map.len(), 1);
        assert_eq!(map.len(), 1);
        sink.retire(key(1));
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn retire_of_unknown_key_is_harmless() {
        let mut map = WeakIdMap::new();
        map.insert(key(1), ());
        map.removal_sink().retire(key(99));
        assert_eq!(map.len(), 1);
        map.flush_pending();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn mutating_ops_commit_staged_removals() {
        let mut map = WeakIdMap::new();
        map.insert(key(1), 1);
        map.removal_sink().retire(key(1));
        map.insert(key(2), 2);
        assert!(map.get(key(1)).is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn plain_map_algebra() {
        let mut map = WeakIdMap::new();
        map.insert(key(1), 1);
        let mut plain = HashMap::new();
        plain.insert(key(1), 10);
        plain.insert(key(2), 20);
        map.merge_from(&plain);
        assert_eq!(map.get(key(1)), Some(&10));
        assert_eq!(map.to_map(), plain);
    }

    #[test]
    fn iteration_sees_live_entries() {
        let mut map = WeakIdMap::new();
        map.insert(key(1), "a");
        map.insert(key(2), "b");
        let mut keys: Vec<u64> = map.iter().map(|(k, _)| k.get()).collect();
        keys.sort();
        assert_eq!(keys, vec![1, 2]);
    }
}
