//! Open-addressed transactional dictionary with a cellar (C6).
//!
//! The whole bucket table lives behind a single `Variable<DictState<K, V>>`;
//! every public operation opens it for read or write inside a [`retry`]
//! loop, so a caller sees either the table entirely before or entirely
//! after any given insert/remove, never a partially-linked chain. This is
//! coarser-grained than the sorted map's per-node variables (§9 of the
//! originating design calls that out as essential there, to avoid spurious
//! conflicts between unrelated subtrees) — a hash table's bucket array has
//! no such natural partition, so one variable for the whole table is both
//! simpler and no less correct.
//!
//! ## Layout
//!
//! The bucket array's first `addressable_len` slots are addressed directly
//! by `hash(key) % addressable_len`; the remaining `physical_len -
//! addressable_len` slots are the "cellar", reserved overflow space so
//! colliding keys don't have to fight over slots that some other key's
//! direct hash address. `addressable_len = floor(43 * physical_len / 50)`
//! (~86%), leaving ~14% cellar.
//!
//! This is true coalesced hashing, not separate chaining with an overflow
//! area: a bucket's `first` field (meaningful only for addressable-region
//! buckets) holds the physical slot of that address's chain head, decoupled
//! from the bucket at the address itself. An address's own home slot can
//! therefore be "stolen" as someone else's overflow node, which is exactly
//! why `first` exists — without it, `hash(key) % addressable_len` would have
//! nowhere to record a chain head that got displaced. `GetFreeSlot` prefers
//! the cellar by scanning from the tail backward, but falls through into the
//! addressable region once the cellar is exhausted, since any unclaimed slot
//! anywhere in the table is fair game as an overflow node.
//!
//! A freed slot is threaded onto a singly-linked free list using the same
//! `next: i64` field a live bucket uses for its chain: `NULL = -1` marks a
//! chain's end, `EMPTY = -2` marks a slot that has never been used and isn't
//! on the free list, and any value `< -2` is a free-list link, decoded as
//! `-(v + 3)`.

use std::sync::Arc;

use stm_core::{Duplicate, Error, Result};
use stm_engine::{retry, Engine, Variable};

const NULL: i64 = -1;
const EMPTY: i64 = -2;

fn encode_free(next_free: i64) -> i64 {
    -(next_free + 3)
}

fn decode_free(encoded: i64) -> i64 {
    -encoded - 3
}

#[derive(Clone)]
struct Bucket<K, V> {
    key: Option<K>,
    value: Option<V>,
    next: i64,
    /// Chain head for this bucket's own address, if this index is an
    /// addressable-region slot. `NULL` until something first hashes here.
    /// Unused (left `NULL`) for cellar slots, which have no address of
    /// their own.
    first: i64,
}

impl<K, V> Bucket<K, V> {
    fn empty() -> Self {
        Bucket {
            key: None,
            value: None,
            next: EMPTY,
            first: NULL,
        }
    }

    fn is_unused(&self) -> bool {
        self.key.is_none() && self.next == EMPTY
    }
}

#[derive(Clone)]
struct DictState<K, V> {
    buckets: Vec<Bucket<K, V>>,
    addressable_len: usize,
    free_list: i64,
    count: usize,
}

fn addressable_len_for(physical_len: usize) -> usize {
    (43 * physical_len) / 50
}

impl<K: Eq + Clone, V: Clone> DictState<K, V> {
    fn with_physical_len(physical_len: usize) -> Self {
        let physical_len = physical_len.max(8);
        DictState {
            buckets: vec![Bucket::empty(); physical_len],
            addressable_len: addressable_len_for(physical_len).max(1),
            free_list: NULL,
            count: 0,
        }
    }

    fn physical_len(&self) -> usize {
        self.buckets.len()
    }

    /// Phase of `GetFreeSlot`: pop the free list if non-empty, else scan the
    /// whole table from the tail backward for a never-used slot. Scanning
    /// from the tail hits the cellar first, since it occupies the high
    /// indices, and only reaches into the addressable region once the
    /// cellar is exhausted.
    fn get_free_slot(&mut self) -> Option<usize> {
        if self.free_list != NULL {
            let slot = self.free_list as usize;
            self.free_list = decode_free(self.buckets[slot].next);
            self.buckets[slot].next = EMPTY;
            return Some(slot);
        }
        for i in (0..self.physical_len()).rev() {
            if self.buckets[i].is_unused() {
                return Some(i);
            }
        }
        None
    }

    /// Frees slot `idx`'s key/value/chain-link, threading it onto the free
    /// list. Leaves `idx`'s own `first` untouched: that field belongs to
    /// whichever address hashes to `idx`, not to whatever chain happened to
    /// be occupying the slot's key/value at the time.
    fn free_slot(&mut self, idx: usize) {
        self.buckets[idx].key = None;
        self.buckets[idx].value = None;
        self.buckets[idx].next = encode_free(self.free_list);
        self.free_list = idx as i64;
    }

    /// Inserts `key`/`value`. If the key is already present: overwrites and
    /// returns the old value when `can_overwrite`, otherwise fails with
    /// `DuplicateKey`. Returns `Ok(None)` for a fresh key.
    fn insert(&mut self, key: K, value: V, can_overwrite: bool, hash: u64) -> Result<Option<V>> {
        let addr = (hash % self.addressable_len as u64) as usize;
        let head = self.buckets[addr].first;

        if head == NULL {
            // No chain for this address yet. Prefer the home slot itself;
            // if it's already holding another address's coalesced entry,
            // get a slot from elsewhere in the table instead.
            let slot = if self.buckets[addr].is_unused() {
                addr
            } else {
                self.get_free_slot().ok_or(Error::Conflict)?
            };
            self.buckets[slot].key = Some(key);
            self.buckets[slot].value = Some(value);
            self.buckets[slot].next = NULL;
            self.buckets[addr].first = slot as i64;
            self.count += 1;
            return Ok(None);
        }

        let mut cur = head as usize;
        loop {
            if self.buckets[cur].key.as_ref() == Some(&key) {
                if can_overwrite {
                    return Ok(std::mem::replace(&mut self.buckets[cur].value, Some(value)));
                }
                return Err(Error::DuplicateKey);
            }
            if self.buckets[cur].next == NULL {
                break;
            }
            cur = self.buckets[cur].next as usize;
        }

        let free = self.get_free_slot().ok_or(Error::Conflict)?;
        self.buckets[free].key = Some(key);
        self.buckets[free].value = Some(value);
        self.buckets[free].next = NULL;
        self.buckets[cur].next = free as i64;
        self.count += 1;
        Ok(None)
    }

    fn find(&self, key: &K, hash: u64) -> Option<usize> {
        let addr = (hash % self.addressable_len as u64) as usize;
        let mut cur = self.buckets[addr].first;
        while cur != NULL {
            let idx = cur as usize;
            if self.buckets[idx].key.as_ref() == Some(key) {
                return Some(idx);
            }
            cur = self.buckets[idx].next;
        }
        None
    }

    fn get(&self, key: &K, hash: u64) -> Option<&V> {
        self.find(key, hash).and_then(|i| self.buckets[i].value.as_ref())
    }

    /// Removes `key`, if present. If the chain head sits in its own home
    /// slot and the chain continues, pulls the next link up into the home
    /// slot so future lookups for this address stay single-hop, then frees
    /// the slot the pulled-up entry vacated. Otherwise just unlinks and
    /// frees the removed slot directly.
    fn remove(&mut self, key: &K, hash: u64) -> Option<V> {
        let addr = (hash % self.addressable_len as u64) as usize;
        let head = self.buckets[addr].first;
        if head == NULL {
            return None;
        }
        let head_idx = head as usize;

        if self.buckets[head_idx].key.as_ref() == Some(key) {
            let removed = self.buckets[head_idx].value.take();
            let next = self.buckets[head_idx].next;
            if next == NULL {
                self.buckets[addr].first = NULL;
                self.free_slot(head_idx);
            } else if head_idx == addr {
                let next_idx = next as usize;
                let moved_key = self.buckets[next_idx].key.take();
                let moved_value = self.buckets[next_idx].value.take();
                let moved_next = self.buckets[next_idx].next;
                self.buckets[head_idx].key = moved_key;
                self.buckets[head_idx].value = moved_value;
                self.buckets[head_idx].next = moved_next;
                self.free_slot(next_idx);
            } else {
                self.buckets[addr].first = next;
                self.free_slot(head_idx);
            }
            self.count -= 1;
            return removed;
        }

        let mut prev = head_idx;
        let mut cur = self.buckets[head_idx].next;
        while cur != NULL {
            let cur_idx = cur as usize;
            if self.buckets[cur_idx].key.as_ref() == Some(key) {
                let removed = self.buckets[cur_idx].value.take();
                let cur_next = self.buckets[cur_idx].next;
                self.buckets[prev].next = cur_next;
                self.free_slot(cur_idx);
                self.count -= 1;
                return removed;
            }
            prev = cur_idx;
            cur = self.buckets[cur_idx].next;
        }
        None
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.buckets
            .iter()
            .filter(|b| b.key.is_some())
            .map(|b| (b.key.clone().unwrap(), b.value.clone().unwrap()))
            .collect()
    }
}

/// An open-addressed hash dictionary, with a cellar, whose mutations run as
/// STM programs (§4.3/§4.4).
///
/// `K` must be `Eq + Clone`; hashing is pluggable (see
/// [`TransactionalDictionary::with_hasher`]) rather than tied to
/// `std::hash::Hash`, so callers may plug in their own (even deliberately
/// bad) hash function.
pub struct TransactionalDictionary<K: Duplicate + Eq + Clone, V: Duplicate + Clone> {
    state: Variable<DictState<K, V>>,
    hash_fn: Arc<dyn Fn(&K) -> u64 + Send + Sync>,
}

impl<K: Duplicate + Eq + Clone + std::hash::Hash, V: Duplicate + Clone> TransactionalDictionary<K, V> {
    /// A new, empty dictionary hashing keys with `std::hash::Hash`.
    pub fn new(engine: Engine) -> Result<Self> {
        Self::with_hasher(engine, 0, |k| {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            k.hash(&mut hasher);
            hasher.finish()
        })
    }
}

impl<K: Duplicate + Eq + Clone, V: Duplicate + Clone> TransactionalDictionary<K, V> {
    /// A new, empty dictionary sized for at least `capacity` entries before
    /// its first rehash, hashing keys with the supplied `hash_fn`. `hash_fn`
    /// need not be a good hash function — the cellar exists precisely to
    /// keep a bad one correct, if slower.
    pub fn with_hasher(
        engine: Engine,
        capacity: usize,
        hash_fn: impl Fn(&K) -> u64 + Send + Sync + 'static,
    ) -> Result<Self> {
        let physical_len = capacity.max(8);
        let state = engine.allocate(DictState::with_physical_len(physical_len))?;
        Ok(TransactionalDictionary {
            state,
            hash_fn: Arc::new(hash_fn),
        })
    }

    fn hash(&self, key: &K) -> u64 {
        (self.hash_fn)(key)
    }

    /// Doubles the addressable region (and the table's physical length
    /// along with it), reinserting every live entry.
    fn rehash(&self, state: &mut DictState<K, V>) {
        let new_physical_len = state.physical_len() * 2;
        tracing::trace!(
            old_physical_len = state.physical_len(),
            new_physical_len,
            count = state.count,
            "rehashing dictionary"
        );
        let old_entries = state.entries();
        let mut fresh = DictState::with_physical_len(new_physical_len);
        for (k, v) in old_entries {
            let h = self.hash(&k);
            fresh
                .insert(k, v, true, h)
                .expect("reinsert into a freshly doubled table cannot fail");
        }
        *state = fresh;
    }

    /// Inserts `key`/`value` into `state`, growing the table (possibly
    /// several times over, for a pathologically bad hash function) until a
    /// free slot can be found. `can_overwrite` is forwarded to
    /// `DictState::insert` unchanged.
    fn insert_with_growth(&self, state: &mut DictState<K, V>, key: K, value: V, can_overwrite: bool) -> Result<Option<V>> {
        if state.count == state.physical_len() {
            self.rehash(state);
        }
        loop {
            let h = self.hash(&key);
            match state.insert(key.duplicate(), value.duplicate(), can_overwrite, h) {
                Ok(old) => return Ok(old),
                Err(Error::Conflict) => self.rehash(state),
                Err(e) => return Err(e),
            }
        }
    }

    /// Inserts `key`/`value`, overwriting and returning any prior value for
    /// `key` (`std::collections::HashMap::insert` semantics).
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>> {
        retry(|| {
            let mut state = self.state.open_for_write()?;
            let result = self.insert_with_growth(&mut state, key.duplicate(), value.duplicate(), true)?;
            self.state.set(state)?;
            Ok(result)
        })
    }

    /// Inserts `key`/`value` only if `key` is not already present; fails
    /// with [`Error::DuplicateKey`] otherwise.
    pub fn try_insert(&self, key: K, value: V) -> Result<()> {
        retry(|| {
            let mut state = self.state.open_for_write()?;
            self.insert_with_growth(&mut state, key.duplicate(), value.duplicate(), false)?;
            self.state.set(state)?;
            Ok(())
        })
    }

    /// Looks up `key`.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        retry(|| {
            let state = self.state.read()?;
            let h = self.hash(key);
            Ok(state.get(key, h).map(Duplicate::duplicate))
        })
    }

    /// True iff `key` is present.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        retry(|| {
            let mut state = self.state.open_for_write()?;
            let h = self.hash(key);
            let removed = state.remove(key, h);
            self.state.set(state)?;
            Ok(removed)
        })
    }

    /// Current number of entries.
    pub fn len(&self) -> Result<usize> {
        retry(|| Ok(self.state.read()?.count))
    }

    /// True iff the dictionary has no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes every entry, resetting to the table's initial capacity.
    pub fn clear(&self) -> Result<()> {
        retry(|| {
            let state = self.state.open_for_write()?;
            let fresh = DictState::with_physical_len(state.physical_len());
            self.state.set(fresh)?;
            Ok(())
        })
    }

    /// A consistent, point-in-time snapshot of every key.
    pub fn keys(&self) -> Result<Vec<K>> {
        retry(|| Ok(self.state.read()?.entries().into_iter().map(|(k, _)| k).collect()))
    }

    /// A consistent, point-in-time snapshot of every value.
    pub fn values(&self) -> Result<Vec<V>> {
        retry(|| Ok(self.state.read()?.entries().into_iter().map(|(_, v)| v).collect()))
    }

    /// A consistent, point-in-time snapshot of every key/value pair.
    pub fn iter(&self) -> Result<Vec<(K, V)>> {
        retry(|| Ok(self.state.read()?.entries()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict_with_bad_hash(engine: Engine, capacity: usize) -> TransactionalDictionary<i64, i64> {
        TransactionalDictionary::with_hasher(engine, capacity, |k: &i64| (*k / 3) as u64).unwrap()
    }

    #[test]
    fn insert_then_get_round_trips() {
        let engine = Engine::new();
        let dict = TransactionalDictionary::<String, i64>::new(engine).unwrap();
        assert_eq!(dict.insert("a".into(), 1).unwrap(), None);
        assert_eq!(dict.get(&"a".to_string()).unwrap(), Some(1));
        assert_eq!(dict.len().unwrap(), 1);
    }

    #[test]
    fn insert_overwrites_and_returns_previous_value() {
        let engine = Engine::new();
        let dict = TransactionalDictionary::<String, i64>::new(engine).unwrap();
        dict.insert("a".into(), 1).unwrap();
        assert_eq!(dict.insert("a".into(), 2).unwrap(), Some(1));
        assert_eq!(dict.get(&"a".to_string()).unwrap(), Some(2));
        assert_eq!(dict.len().unwrap(), 1);
    }

    #[test]
    fn try_insert_rejects_duplicate_keys() {
        let engine = Engine::new();
        let dict = TransactionalDictionary::<String, i64>::new(engine).unwrap();
        dict.try_insert("a".into(), 1).unwrap();
        assert!(matches!(
            dict.try_insert("a".into(), 2),
            Err(Error::DuplicateKey)
        ));
    }

    #[test]
    fn remove_returns_value_and_shrinks_count() {
        let engine = Engine::new();
        let dict = TransactionalDictionary::<String, i64>::new(engine).unwrap();
        dict.insert("a".into(), 1).unwrap();
        assert_eq!(dict.remove(&"a".to_string()).unwrap(), Some(1));
        assert_eq!(dict.len().unwrap(), 0);
        assert_eq!(dict.remove(&"a".to_string()).unwrap(), None);
    }

    #[test]
    fn fuzzing_with_a_deliberately_bad_hash_keeps_every_key_retrievable() {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let engine = Engine::new();
        let dict = dict_with_bad_hash(engine, 8);
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut keys: Vec<i64> = (0..100).collect();
        keys.shuffle(&mut rng);

        let mut inserted = Vec::new();
        for &k in &keys {
            dict.insert(k, k * 10).unwrap();
            inserted.push(k);
            for &prior in &inserted {
                assert_eq!(dict.get(&prior).unwrap(), Some(prior * 10));
            }
        }
        assert_eq!(dict.len().unwrap(), 100);

        for &k in keys.iter().rev() {
            assert_eq!(dict.remove(&k).unwrap(), Some(k * 10));
        }
        assert_eq!(dict.len().unwrap(), 0);
    }

    #[test]
    fn clear_resets_to_empty() {
        let engine = Engine::new();
        let dict = TransactionalDictionary::<String, i64>::new(engine).unwrap();
        dict.insert("a".into(), 1).unwrap();
        dict.insert("b".into(), 2).unwrap();
        dict.clear().unwrap();
        assert_eq!(dict.len().unwrap(), 0);
        assert_eq!(dict.get(&"a".to_string()).unwrap(), None);
    }

    #[test]
    fn rollback_after_forced_rehash_restores_original_entries() {
        let engine = Engine::new();
        let dict = dict_with_bad_hash(engine, 8);
        dict.insert(1, 10).unwrap();
        dict.insert(2, 20).unwrap();
        dict.insert(3, 30).unwrap();

        {
            // Manually drive the same state variable, mimicking what
            // `insert` would do across many calls, but inside a single
            // transaction that is dropped (never committed).
            let txn = engine.create();
            let mut state = dict.state.open_for_write().unwrap();
            for k in 100..130 {
                if state.count == state.physical_len() {
                    dict.rehash(&mut state);
                }
                let h = dict.hash(&k);
                state.insert(k, k * 10, true, h).unwrap();
            }
            // Clear the table, then repopulate it with an entirely
            // different set of entries, all still inside the same
            // transaction.
            let mut fresh = DictState::with_physical_len(state.physical_len());
            for k in 900..910 {
                let h = dict.hash(&k);
                fresh.insert(k, k * 10, true, h).unwrap();
            }
            dict.state.set(fresh).unwrap();
            drop(txn);
        }

        // The whole transaction is rolled back: neither the forced-rehash
        // inserts nor the clear-and-repopulate ever happened.
        assert_eq!(dict.len().unwrap(), 3);
        assert_eq!(dict.get(&1).unwrap(), Some(10));
        assert_eq!(dict.get(&2).unwrap(), Some(20));
        assert_eq!(dict.get(&3).unwrap(), Some(30));
        for k in 900..910 {
            assert_eq!(dict.get(&k).unwrap(), None);
        }
    }

    #[test]
    fn keys_values_and_iter_are_consistent() {
        let engine = Engine::new();
        let dict = TransactionalDictionary::<String, i64>::new(engine).unwrap();
        dict.insert("a".into(), 1).unwrap();
        dict.insert("b".into(), 2).unwrap();
        let mut pairs = dict.iter().unwrap();
        pairs.sort();
        assert_eq!(pairs, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        let mut keys = dict.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        let mut values = dict.values().unwrap();
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }
}
