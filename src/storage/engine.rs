//! Sharded Keyspace with Expiry Support
//!
//! This module implements the keyspace: the single owner of every stored
//! [`Value`]. Callers never receive references into it. Reads hand a borrowed
//! view to a closure under the shard's read lock, or copy the value out;
//! writes hand the key's slot to a closure under the write lock.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: keys hash into independent shards, each behind a
//!    `parking_lot::RwLock`, so unrelated keys never contend.
//! 2. **Lazy Expiry**: an entry whose deadline has passed is absent to every
//!    read and write, whether or not the sweeper has removed it yet.
//! 3. **Ordered Multi-Key Locking**: operations spanning several keys lock
//!    every involved shard in ascending shard order, so two commands touching
//!    the same keys in a different argument order cannot deadlock.
//! 4. **Empty Collections Vanish**: a field map, sequence or set left empty by
//!    a write is deleted together with its key.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ entries │ │ entries │ │ entries │ │ entries │           │
//! │  │ expiry  │ │ expiry  │ │ expiry  │ │ expiry  │           │
//! │  │ index   │ │ index   │ │ index   │ │ index   │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each shard keeps a deadline-ordered index of keys with a TTL and the set of
//! keys whose field maps carry per-field TTLs. The sweeper uses both to evict
//! in bounded batches without scanning persistent keys.

use bytes::Bytes;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::{BTreeSet, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::clock::{is_past, Clock, Expiry, MonotonicClock};
use super::glob::glob_match;
use super::value::{Value, ValueType};
use crate::error::{StoreError, StoreResult};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 64;

/// A stored value with its optional key-level deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry without expiry.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry that expires at `deadline`.
    pub fn with_deadline(value: Value, deadline: Instant) -> Self {
        Self {
            value,
            expires_at: Some(deadline),
        }
    }

    /// Checks whether the entry is absent at `now`.
    ///
    /// A field map whose every field has expired counts as expired too.
    pub fn is_expired(&self, now: Instant) -> bool {
        if is_past(self.expires_at, now) {
            return true;
        }
        match &self.value {
            Value::FieldMap(map) => map.has_expiring_fields() && map.live_len(now) == 0,
            _ => false,
        }
    }

    /// Remaining time to live, or `None` without expiry.
    pub fn ttl(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(now))
    }
}

/// Result of a TTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key does not exist.
    Absent,
    /// The key exists and never expires.
    NoExpiry,
    /// The key expires after this much time.
    Remaining(Duration),
}

/// The data held by one shard.
#[derive(Debug, Default)]
struct ShardMap {
    entries: HashMap<Bytes, Entry>,
    /// Keys with a key-level deadline, ordered by deadline.
    deadlines: BTreeSet<(Instant, Bytes)>,
    /// Keys holding a field map with at least one field TTL.
    field_ttl_keys: BTreeSet<Bytes>,
    /// Last field map visited by the sweeper; the next pass resumes after it.
    field_sweep_cursor: Option<Bytes>,
}

impl ShardMap {
    fn get(&self, key: &[u8]) -> Option<&Entry> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: Bytes, entry: Entry) {
        self.remove(&key);
        if let Some(at) = entry.expires_at {
            self.deadlines.insert((at, key.clone()));
        }
        if entry.value.has_field_expiry() {
            self.field_ttl_keys.insert(key.clone());
        }
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        let (key, entry) = self.entries.remove_entry(key)?;
        if let Some(at) = entry.expires_at {
            self.deadlines.remove(&(at, key.clone()));
        }
        self.field_ttl_keys.remove(&key);
        Some(entry)
    }

    /// Removes the entry for `key` and returns it if it is still live.
    ///
    /// Expired fields of a field map are purged on the way out. The second
    /// element is `true` when an expired entry was discarded.
    fn take_live(&mut self, key: &[u8], now: Instant) -> (Option<Entry>, bool) {
        match self.remove(key) {
            Some(entry) if entry.is_expired(now) => (None, true),
            Some(mut entry) => {
                if let Value::FieldMap(map) = &mut entry.value {
                    map.purge_expired(now);
                }
                (Some(entry), false)
            }
            None => (None, false),
        }
    }

    /// Picks up to `batch` field maps to purge, continuing after the map the
    /// previous pass ended on and wrapping around to the first key.
    fn next_field_maps(&mut self, batch: usize) -> Vec<Bytes> {
        let last = self.field_sweep_cursor.take();
        let mut picked: Vec<Bytes> = match &last {
            Some(last) => self
                .field_ttl_keys
                .range((Bound::Excluded(last.clone()), Bound::Unbounded))
                .take(batch)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let wrapped = self
            .field_ttl_keys
            .iter()
            .take_while(|key| last.as_ref().map_or(true, |last| *key <= last))
            .take(batch - picked.len())
            .cloned();
        picked.extend(wrapped);
        self.field_sweep_cursor = picked.last().cloned();
        picked
    }

    /// Writes a slot back after a mutation. Empty collections are dropped.
    fn put_back(&mut self, key: Bytes, slot: Option<Entry>) {
        if let Some(entry) = slot {
            if !entry.value.is_empty_collection() {
                self.insert(key, entry);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Shard {
    map: RwLock<ShardMap>,
}

/// The slots of several keys, locked together by [`Keyspace::update_many`].
///
/// Keys are deduplicated. Looking up a key that was not requested panics.
#[derive(Debug)]
pub struct Slots {
    slots: Vec<(Bytes, Option<Entry>)>,
}

impl Slots {
    fn position(&self, key: &[u8]) -> usize {
        self.slots
            .iter()
            .position(|(k, _)| k.as_ref() == key)
            .expect("key was not locked by update_many")
    }

    /// The live entry for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<&Entry> {
        self.slots[self.position(key)].1.as_ref()
    }

    /// Mutable access to the slot of `key`.
    pub fn slot_mut(&mut self, key: &[u8]) -> &mut Option<Entry> {
        let idx = self.position(key);
        &mut self.slots[idx].1
    }

    /// Takes the entry out of the slot of `key`, leaving it empty.
    pub fn take(&mut self, key: &[u8]) -> Option<Entry> {
        self.slot_mut(key).take()
    }
}

/// The keyspace: a sharded map from key to typed value.
///
/// This struct is designed to be wrapped in an `Arc` and shared by every
/// caller. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use emberkv::storage::{Keyspace, Value, ValueType};
/// use bytes::Bytes;
///
/// let keyspace = Keyspace::new();
/// keyspace.insert(Bytes::from("name"), Value::Scalar(Bytes::from("Ariz")));
///
/// let value = keyspace.lookup(b"name", ValueType::Scalar).unwrap();
/// assert_eq!(value, Some(Value::Scalar(Bytes::from("Ariz"))));
///
/// // Asking for the wrong structure type is an error, not an absence.
/// assert!(keyspace.lookup(b"name", ValueType::Sequence).is_err());
/// ```
pub struct Keyspace {
    shards: Vec<Shard>,
    clock: Arc<dyn Clock>,

    /// Statistics: read operations
    read_count: AtomicU64,

    /// Statistics: write operations
    write_count: AtomicU64,

    /// Statistics: explicit deletions
    del_count: AtomicU64,

    /// Statistics: entries dropped because they expired
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("shards", &self.shards.len())
            .field("clock", &self.clock)
            .field("read_count", &self.read_count.load(Ordering::Relaxed))
            .field("write_count", &self.write_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    /// Creates a keyspace with [`DEFAULT_SHARDS`] shards and the monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_SHARDS, Arc::new(MonotonicClock))
    }

    /// Creates a keyspace with a custom shard count and clock.
    pub fn with_clock(shards: usize, clock: Arc<dyn Clock>) -> Self {
        let shards = shards.max(1);
        info!(shards, "Keyspace initialized");
        Self {
            shards: (0..shards).map(|_| Shard::default()).collect(),
            clock,
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// The clock every expiry decision is made against.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Shared handle to the clock.
    pub fn clock_handle(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Current instant according to the keyspace clock.
    #[inline]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    fn note_expired(&self, n: u64) {
        if n > 0 {
            self.expired_count.fetch_add(n, Ordering::Relaxed);
        }
    }

    // ========================================================================
    // Closure access
    // ========================================================================

    /// Runs `f` against the live value of `key` under the shard's read lock.
    ///
    /// `f` receives `None` when the key is absent or expired. Field maps may
    /// still contain expired fields; `f` gets the same `now` that was used
    /// for the key check and must filter fields against it.
    pub fn view<R>(&self, key: &[u8], f: impl FnOnce(Option<&Value>, Instant) -> R) -> R {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let now = self.now();
        let shard = self.shard(key);

        {
            let map = shard.map.read();
            match map.get(key) {
                None => return f(None, now),
                Some(entry) if !entry.is_expired(now) => return f(Some(&entry.value), now),
                Some(_) => {}
            }
        }

        // Expired: escalate to the write lock to reclaim it.
        self.purge_if_expired(shard, key, now);
        f(None, now)
    }

    fn purge_if_expired(&self, shard: &Shard, key: &[u8], now: Instant) {
        let mut map = shard.map.write();
        if map.get(key).is_some_and(|e| e.is_expired(now)) {
            map.remove(key);
            self.note_expired(1);
        }
    }

    /// Runs `f` with exclusive access to the slot of `key`.
    ///
    /// The slot is `None` if the key is absent or expired. Whatever `f`
    /// leaves in the slot is stored; an empty collection deletes the key.
    /// Commands validate before they mutate, so returning an error from `f`
    /// with the slot untouched leaves the keyspace unchanged.
    pub fn update<R>(&self, key: &Bytes, f: impl FnOnce(&mut Option<Entry>, Instant) -> R) -> R {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let now = self.now();
        let mut map = self.shard(key).map.write();

        let (mut slot, expired) = map.take_live(key, now);
        if expired {
            self.note_expired(1);
        }
        let out = f(&mut slot, now);
        map.put_back(key.clone(), slot);
        out
    }

    /// Runs `f` with exclusive access to the slots of several keys at once.
    ///
    /// Every involved shard is write-locked in ascending shard order before
    /// any slot is read, and released only after every slot is written back.
    pub fn update_many<R>(&self, keys: &[Bytes], f: impl FnOnce(&mut Slots, Instant) -> R) -> R {
        self.write_count.fetch_add(1, Ordering::Relaxed);

        let mut unique: Vec<Bytes> = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(key) {
                unique.push(key.clone());
            }
        }

        let mut order: Vec<usize> = unique.iter().map(|k| self.shard_index(k)).collect();
        order.sort_unstable();
        order.dedup();

        let mut guards: Vec<(usize, RwLockWriteGuard<'_, ShardMap>)> = order
            .into_iter()
            .map(|idx| (idx, self.shards[idx].map.write()))
            .collect();

        let now = self.now();
        let mut expired = 0;
        let mut slots = Slots {
            slots: Vec::with_capacity(unique.len()),
        };
        for key in unique {
            let guard = Self::guard_for(&mut guards, self.shard_index(&key));
            let (entry, was_expired) = guard.take_live(&key, now);
            if was_expired {
                expired += 1;
            }
            slots.slots.push((key, entry));
        }
        self.note_expired(expired);

        let out = f(&mut slots, now);

        for (key, entry) in slots.slots {
            let guard = Self::guard_for(&mut guards, self.shard_index(&key));
            guard.put_back(key, entry);
        }
        out
    }

    fn guard_for<'g, 'a>(
        guards: &'g mut [(usize, RwLockWriteGuard<'a, ShardMap>)],
        shard: usize,
    ) -> &'g mut ShardMap {
        let pos = guards
            .binary_search_by_key(&shard, |(idx, _)| *idx)
            .expect("shard was locked by update_many");
        &mut *guards[pos].1
    }

    // ========================================================================
    // Keyspace contract
    // ========================================================================

    /// Copies out the value of `key`, checking its structure type.
    ///
    /// Returns `Ok(None)` if the key is absent and `Err(WrongType)` if it
    /// holds a different structure.
    pub fn lookup(&self, key: &[u8], required: ValueType) -> StoreResult<Option<Value>> {
        self.view(key, |value, now| match value {
            None => Ok(None),
            Some(v) if v.value_type() == required => Ok(Some(v.snapshot(now))),
            Some(_) => Err(StoreError::WrongType),
        })
    }

    /// Stores `value` under `key` without expiry, replacing whatever was there.
    pub fn insert(&self, key: Bytes, value: Value) {
        self.update(&key, |slot, _| *slot = Some(Entry::new(value)));
    }

    /// Stores `value` under `key` with an expiry, replacing whatever was there.
    ///
    /// Fails with `OutOfRange` if the deadline cannot be represented.
    pub fn insert_with_expiry(
        &self,
        key: Bytes,
        value: Value,
        expiry: Expiry,
    ) -> StoreResult<()> {
        let deadline = expiry.deadline(self.clock())?;
        self.update(&key, |slot, now| {
            *slot = if deadline <= now {
                None
            } else {
                Some(Entry::with_deadline(value, deadline))
            };
        });
        Ok(())
    }

    /// Deletes a key. Returns `true` if a live key was removed.
    pub fn remove(&self, key: &Bytes) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.update(key, |slot, _| slot.take().is_some())
    }

    /// Deletes several keys and returns how many were removed.
    pub fn remove_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|k| self.remove(k)).count() as u64
    }

    /// Sets the deadline of an existing key.
    ///
    /// A deadline at or before now deletes the key immediately. Returns
    /// `false` if the key does not exist.
    pub fn set_expiry(&self, key: &Bytes, expiry: Expiry) -> StoreResult<bool> {
        let deadline = expiry.deadline(self.clock())?;
        Ok(self.update(key, |slot, now| match slot {
            None => false,
            Some(_) if deadline <= now => {
                *slot = None;
                true
            }
            Some(entry) => {
                entry.expires_at = Some(deadline);
                true
            }
        }))
    }

    /// Removes the deadline of a key.
    ///
    /// Returns `true` only if the key existed and had a deadline.
    pub fn persist(&self, key: &Bytes) -> bool {
        self.update(key, |slot, _| match slot {
            Some(entry) => entry.expires_at.take().is_some(),
            None => false,
        })
    }

    /// Time to live of a key.
    pub fn ttl(&self, key: &[u8]) -> Ttl {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let now = self.now();
        let map = self.shard(key).map.read();
        match map.get(key) {
            Some(entry) if !entry.is_expired(now) => match entry.ttl(now) {
                Some(remaining) => Ttl::Remaining(remaining),
                None => Ttl::NoExpiry,
            },
            _ => Ttl::Absent,
        }
    }

    /// Checks if a key exists and has not expired.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.view(key, |value, _| value.is_some())
    }

    /// Counts how many of the given keys exist.
    pub fn exists_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|k| self.exists(k)).count() as u64
    }

    /// Structure type of a key, or `None` if absent.
    pub fn key_type(&self, key: &[u8]) -> Option<ValueType> {
        self.view(key, |value, _| value.map(Value::value_type))
    }

    /// Returns all live keys matching a glob pattern.
    ///
    /// **Warning**: this scans every shard.
    pub fn keys(&self, pattern: &str) -> Vec<Bytes> {
        let now = self.now();
        let mut result = Vec::new();
        for shard in &self.shards {
            let map = shard.map.read();
            for (key, entry) in map.entries.iter() {
                if !entry.is_expired(now) && glob_match(pattern.as_bytes(), key) {
                    result.push(key.clone());
                }
            }
        }
        result
    }

    /// Cursor-based iteration over the whole keyspace.
    ///
    /// Start with cursor `0`; iteration is complete when the returned cursor
    /// is `0` again. The cursor is the index of the next shard to visit and
    /// each call returns whole shards, so every key that exists for the
    /// entire scan is returned at least once. Keys added or removed during
    /// the scan may or may not appear, and `count` is only a hint.
    pub fn scan(&self, cursor: u64, count: usize, pattern: Option<&str>) -> (u64, Vec<Bytes>) {
        let now = self.now();
        let count = count.max(1);
        let mut result = Vec::new();
        let mut idx = cursor as usize;

        while idx < self.shards.len() {
            {
                let map = self.shards[idx].map.read();
                result.extend(
                    map.entries
                        .iter()
                        .filter(|(key, entry)| {
                            !entry.is_expired(now)
                                && pattern.map_or(true, |p| glob_match(p.as_bytes(), key))
                        })
                        .map(|(key, _)| key.clone()),
                );
            }
            idx += 1;
            if result.len() >= count {
                break;
            }
        }

        let next = if idx >= self.shards.len() { 0 } else { idx as u64 };
        (next, result)
    }

    /// Clears all data.
    pub fn flush(&self) {
        for shard in &self.shards {
            let mut map = shard.map.write();
            *map = ShardMap::default();
        }
        info!("Keyspace flushed");
    }

    /// Number of stored keys, including expired keys not yet reclaimed.
    pub fn len(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.map.read().entries.len() as u64)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys with a key-level deadline.
    pub fn volatile_len(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.map.read().deadlines.len() as u64)
            .sum()
    }

    /// Returns keyspace statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            volatile_keys: self.volatile_len(),
            reads: self.read_count.load(Ordering::Relaxed),
            writes: self.write_count.load(Ordering::Relaxed),
            deletes: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Active expiry
    // ========================================================================

    /// Evicts at most `batch` expired keys from one shard, in deadline order,
    /// and purges expired fields from at most `batch` field maps. Successive
    /// calls visit the shard's field maps round-robin.
    ///
    /// Returns the number of keys evicted.
    pub fn evict_expired_in_shard(&self, shard: usize, batch: usize) -> u64 {
        let Some(shard) = self.shards.get(shard) else {
            return 0;
        };
        let now = self.now();
        let mut map = shard.map.write();
        let mut evicted = 0u64;

        while (evicted as usize) < batch {
            let due = match map.deadlines.first() {
                Some((at, key)) if *at <= now => key.clone(),
                _ => break,
            };
            map.remove(&due);
            evicted += 1;
        }

        let with_fields = map.next_field_maps(batch);
        for key in with_fields {
            let Some(mut entry) = map.remove(&key) else {
                continue;
            };
            if let Value::FieldMap(fields) = &mut entry.value {
                fields.purge_expired(now);
            }
            if entry.value.is_empty_collection() {
                evicted += 1;
            } else {
                map.insert(key, entry);
            }
        }

        self.note_expired(evicted);
        evicted
    }

    /// Evicts expired keys from every shard, `batch` per shard at most.
    pub fn evict_expired(&self, batch: usize) -> u64 {
        let evicted = (0..self.shards.len())
            .map(|idx| self.evict_expired_in_shard(idx, batch))
            .sum();
        if evicted > 0 {
            debug!(evicted, "Evicted expired keys");
        }
        evicted
    }

    /// Evicts every expired key.
    pub fn cleanup_expired(&self) -> u64 {
        self.evict_expired(usize::MAX)
    }
}

/// Keyspace statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Keys currently stored
    pub keys: u64,
    /// Keys with a deadline
    pub volatile_keys: u64,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Explicit deletions
    pub deletes: u64,
    /// Entries reclaimed because they expired
    pub expired: u64,
}
