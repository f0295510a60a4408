//! Unique set commands.
//!
//! The algebra commands treat an absent key as the empty set. Every source
//! key is type-checked, so a single non-set argument fails the whole command.

use bytes::Bytes;
use rand::seq::{IteratorRandom, SliceRandom};
use std::collections::HashSet;

use super::handler::{as_set, require_args, set_mut, set_or_create, CommandExecutor};
use crate::error::{StoreError, StoreResult};
use crate::storage::{Entry, Slots, Value, ValueType};

/// Largest `|count|` accepted by [`CommandExecutor::random_members`].
pub const MAX_RANDOM_MEMBERS: u64 = 1 << 24;

#[derive(Debug, Clone, Copy)]
enum SetOp {
    Intersect,
    Union,
    Difference,
}

impl SetOp {
    fn name(&self) -> &'static str {
        match self {
            SetOp::Intersect => "sinter",
            SetOp::Union => "sunion",
            SetOp::Difference => "sdiff",
        }
    }

    /// Combines the sets in argument order.
    fn apply(&self, sets: &[Option<&HashSet<Bytes>>]) -> HashSet<Bytes> {
        let Some((first, rest)) = sets.split_first() else {
            return HashSet::new();
        };
        match self {
            SetOp::Intersect => {
                if sets.iter().any(Option::is_none) {
                    return HashSet::new();
                }
                let present: Vec<&HashSet<Bytes>> = sets.iter().flatten().copied().collect();
                let Some(smallest) = present.iter().min_by_key(|s| s.len()) else {
                    return HashSet::new();
                };
                smallest
                    .iter()
                    .filter(|m| present.iter().all(|s| s.contains(*m)))
                    .cloned()
                    .collect()
            }
            SetOp::Union => sets.iter().flatten().flat_map(|s| s.iter().cloned()).collect(),
            SetOp::Difference => match first {
                Some(first) => first
                    .iter()
                    .filter(|m| rest.iter().flatten().all(|s| !s.contains(*m)))
                    .cloned()
                    .collect(),
                None => HashSet::new(),
            },
        }
    }
}

/// Reads the set held by `key` within a locked group of slots.
fn slot_set<'a>(slots: &'a Slots, key: &[u8]) -> StoreResult<Option<&'a HashSet<Bytes>>> {
    as_set(slots.get(key).map(|e| &e.value))
}

impl CommandExecutor {
    /// SADD key member [member ...]
    ///
    /// Returns the number of members that were not already present.
    pub fn add(&self, key: &Bytes, members: Vec<Bytes>) -> StoreResult<usize> {
        require_args(&members, "sadd")?;
        self.keyspace.update(key, |slot, _| {
            let set = set_or_create(slot)?;
            Ok(members.into_iter().filter(|m| set.insert(m.clone())).count())
        })
    }

    /// SREM key member [member ...]
    ///
    /// Removing the last member deletes the key.
    pub fn remove(&self, key: &Bytes, members: &[Bytes]) -> StoreResult<usize> {
        require_args(members, "srem")?;
        self.keyspace.update(key, |slot, _| {
            let Some(set) = set_mut(slot)? else {
                return Ok(0);
            };
            Ok(members.iter().filter(|m| set.remove(*m)).count())
        })
    }

    /// SISMEMBER key member
    pub fn is_member(&self, key: &[u8], member: &[u8]) -> StoreResult<bool> {
        self.keyspace
            .view(key, |value, _| Ok(as_set(value)?.is_some_and(|s| s.contains(member))))
    }

    /// SMEMBERS key
    ///
    /// Order is unspecified.
    pub fn members(&self, key: &[u8]) -> StoreResult<Vec<Bytes>> {
        self.keyspace.view(key, |value, _| {
            Ok(as_set(value)?
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default())
        })
    }

    /// SCARD key
    pub fn cardinality(&self, key: &[u8]) -> StoreResult<usize> {
        self.keyspace
            .view(key, |value, _| Ok(as_set(value)?.map_or(0, HashSet::len)))
    }

    fn combine(&self, op: SetOp, keys: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        require_args(keys, op.name())?;
        let sets = keys
            .iter()
            .map(|key| {
                self.keyspace
                    .view(key, |value, _| Ok(as_set(value)?.cloned()))
            })
            .collect::<StoreResult<Vec<Option<HashSet<Bytes>>>>>()?;
        let borrowed: Vec<Option<&HashSet<Bytes>>> = sets.iter().map(Option::as_ref).collect();
        Ok(op.apply(&borrowed).into_iter().collect())
    }

    fn combine_store(&self, op: SetOp, destination: &Bytes, keys: &[Bytes]) -> StoreResult<usize> {
        require_args(keys, op.name())?;
        let mut locked = Vec::with_capacity(keys.len() + 1);
        locked.push(destination.clone());
        locked.extend_from_slice(keys);

        self.keyspace.update_many(&locked, |slots, _| {
            let sets = keys
                .iter()
                .map(|key| slot_set(slots, key))
                .collect::<StoreResult<Vec<_>>>()?;
            let result = op.apply(&sets);
            let len = result.len();
            *slots.slot_mut(destination) = if result.is_empty() {
                None
            } else {
                Some(Entry::new(Value::UniqueSet(result)))
            };
            Ok(len)
        })
    }

    /// SINTER key [key ...]
    pub fn intersect(&self, keys: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        self.combine(SetOp::Intersect, keys)
    }

    /// SUNION key [key ...]
    pub fn union(&self, keys: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        self.combine(SetOp::Union, keys)
    }

    /// SDIFF key [key ...]
    ///
    /// Members of the first set that are in none of the others.
    pub fn difference(&self, keys: &[Bytes]) -> StoreResult<Vec<Bytes>> {
        self.combine(SetOp::Difference, keys)
    }

    /// SINTERSTORE destination key [key ...]
    ///
    /// Overwrites `destination` whatever it held; an empty result deletes it.
    /// Returns the size of the stored set.
    pub fn intersect_store(&self, destination: &Bytes, keys: &[Bytes]) -> StoreResult<usize> {
        self.combine_store(SetOp::Intersect, destination, keys)
    }

    /// SUNIONSTORE destination key [key ...]
    pub fn union_store(&self, destination: &Bytes, keys: &[Bytes]) -> StoreResult<usize> {
        self.combine_store(SetOp::Union, destination, keys)
    }

    /// SDIFFSTORE destination key [key ...]
    pub fn difference_store(&self, destination: &Bytes, keys: &[Bytes]) -> StoreResult<usize> {
        self.combine_store(SetOp::Difference, destination, keys)
    }

    /// SRANDMEMBER key count
    ///
    /// A positive `count` returns up to that many distinct members. A negative
    /// `count` returns exactly `|count|` members, possibly repeated.
    /// `|count|` above [`MAX_RANDOM_MEMBERS`] is `OutOfRange`.
    pub fn random_members(&self, key: &[u8], count: i64) -> StoreResult<Vec<Bytes>> {
        let wanted = count.unsigned_abs();
        if wanted > MAX_RANDOM_MEMBERS {
            return Err(StoreError::OutOfRange("count is out of range"));
        }
        let wanted = wanted as usize;

        self.keyspace.view(key, |value, _| {
            let Some(set) = as_set(value)? else {
                return Ok(Vec::new());
            };
            let mut rng = rand::thread_rng();

            if count >= 0 {
                let wanted = wanted.min(set.len());
                return Ok(set.iter().cloned().choose_multiple(&mut rng, wanted));
            }
            let pool: Vec<&Bytes> = set.iter().collect();
            if pool.is_empty() {
                return Ok(Vec::new());
            }
            let mut chosen = Vec::with_capacity(wanted);
            for _ in 0..wanted {
                if let Some(member) = pool.choose(&mut rng) {
                    chosen.push((*member).clone());
                }
            }
            Ok(chosen)
        })
    }

    /// SPOP key count
    ///
    /// Removes and returns up to `count` random members.
    pub fn pop_members(&self, key: &Bytes, count: usize) -> StoreResult<Vec<Bytes>> {
        self.keyspace.update(key, |slot, _| {
            let Some(set) = set_mut(slot)? else {
                return Ok(Vec::new());
            };
            let count = count.min(set.len());
            let chosen = set
                .iter()
                .cloned()
                .choose_multiple(&mut rand::thread_rng(), count);
            for member in &chosen {
                set.remove(member);
            }
            Ok(chosen)
        })
    }

    /// SMOVE source destination member
    ///
    /// Returns `false` if `member` was not in `source`.
    pub fn move_member(
        &self,
        source: &Bytes,
        destination: &Bytes,
        member: &Bytes,
    ) -> StoreResult<bool> {
        let keys = [source.clone(), destination.clone()];
        self.keyspace.update_many(&keys, |slots, _| {
            if let Some(entry) = slots.get(destination) {
                if entry.value.value_type() != ValueType::UniqueSet {
                    return Err(StoreError::WrongType);
                }
            }
            let Some(set) = set_mut(slots.slot_mut(source))? else {
                return Ok(false);
            };
            if !set.remove(member) {
                return Ok(false);
            }
            set_or_create(slots.slot_mut(destination))?.insert(member.clone());
            Ok(true)
        })
    }
}
