//! Sequence commands.
//!
//! Every command that adds elements wakes blocked consumers once the key's
//! lock has been released, one waiter per new element.

use bytes::Bytes;
use std::collections::VecDeque;

use super::command::End;
use super::handler::{as_sequence, require_args, sequence_mut, sequence_or_create, CommandExecutor};
use crate::error::{StoreError, StoreResult};
use crate::storage::value::{resolve_index, resolve_range};
use crate::storage::ValueType;

fn push_end(list: &mut VecDeque<Bytes>, end: End, value: Bytes) {
    match end {
        End::Left => list.push_front(value),
        End::Right => list.push_back(value),
    }
}

fn pop_end(list: &mut VecDeque<Bytes>, end: End) -> Option<Bytes> {
    match end {
        End::Left => list.pop_front(),
        End::Right => list.pop_back(),
    }
}

impl CommandExecutor {
    /// Wakes up to `added` waiters blocked on `key`.
    pub(super) fn wake(&self, key: &[u8], added: usize) {
        if added > 0 {
            self.blocking.notify(key, added);
        }
    }

    /// LPUSH / RPUSH key element [element ...]
    ///
    /// Creates the sequence if absent. Elements are pushed one at a time in
    /// argument order, so `LPUSH k a b c` leaves `c b a`. Returns the new length.
    pub fn push(&self, key: &Bytes, end: End, values: Vec<Bytes>) -> StoreResult<usize> {
        require_args(&values, "push")?;
        let added = values.len();
        let len = self.keyspace.update(key, |slot, _| {
            let list = sequence_or_create(slot)?;
            for value in values {
                push_end(list, end, value);
            }
            Ok(list.len())
        })?;
        self.wake(key, added);
        Ok(len)
    }

    /// LPUSH key element [element ...]
    pub fn push_left(&self, key: &Bytes, values: Vec<Bytes>) -> StoreResult<usize> {
        self.push(key, End::Left, values)
    }

    /// RPUSH key element [element ...]
    pub fn push_right(&self, key: &Bytes, values: Vec<Bytes>) -> StoreResult<usize> {
        self.push(key, End::Right, values)
    }

    /// LPUSHX / RPUSHX key element [element ...]
    ///
    /// Only pushes onto an existing sequence. Returns the length, `0` if absent.
    pub fn push_existing(&self, key: &Bytes, end: End, values: Vec<Bytes>) -> StoreResult<usize> {
        require_args(&values, "pushx")?;
        let added = values.len();
        let len = self.keyspace.update(key, |slot, _| {
            let Some(list) = sequence_mut(slot)? else {
                return Ok(0);
            };
            for value in values {
                push_end(list, end, value);
            }
            Ok(list.len())
        })?;
        if len > 0 {
            self.wake(key, added);
        }
        Ok(len)
    }

    /// LPUSHX key element [element ...]
    pub fn push_left_existing(&self, key: &Bytes, values: Vec<Bytes>) -> StoreResult<usize> {
        self.push_existing(key, End::Left, values)
    }

    /// RPUSHX key element [element ...]
    pub fn push_right_existing(&self, key: &Bytes, values: Vec<Bytes>) -> StoreResult<usize> {
        self.push_existing(key, End::Right, values)
    }

    /// LPOP / RPOP key [count]
    ///
    /// Removes up to `count` elements. Popping the last element deletes the key.
    pub fn pop(&self, key: &Bytes, end: End, count: usize) -> StoreResult<Vec<Bytes>> {
        self.keyspace.update(key, |slot, _| {
            let Some(list) = sequence_mut(slot)? else {
                return Ok(Vec::new());
            };
            let n = count.min(list.len());
            Ok((0..n).filter_map(|_| pop_end(list, end)).collect())
        })
    }

    /// LPOP key [count]
    pub fn pop_left(&self, key: &Bytes, count: usize) -> StoreResult<Vec<Bytes>> {
        self.pop(key, End::Left, count)
    }

    /// RPOP key [count]
    pub fn pop_right(&self, key: &Bytes, count: usize) -> StoreResult<Vec<Bytes>> {
        self.pop(key, End::Right, count)
    }

    /// LRANGE key start stop
    pub fn range(&self, key: &[u8], start: i64, end: i64) -> StoreResult<Vec<Bytes>> {
        self.keyspace.view(key, |value, _| {
            let Some(list) = as_sequence(value)? else {
                return Ok(Vec::new());
            };
            Ok(match resolve_range(start, end, list.len()) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            })
        })
    }

    /// LINDEX key index
    pub fn index(&self, key: &[u8], index: i64) -> StoreResult<Option<Bytes>> {
        self.keyspace.view(key, |value, _| {
            Ok(as_sequence(value)?.and_then(|list| {
                resolve_index(index, list.len()).and_then(|i| list.get(i).cloned())
            }))
        })
    }

    /// LSET key index element
    pub fn set_index(&self, key: &Bytes, index: i64, value: Bytes) -> StoreResult<()> {
        self.keyspace.update(key, |slot, _| {
            let list = sequence_mut(slot)?.ok_or(StoreError::NoSuchKey)?;
            let i = resolve_index(index, list.len())
                .ok_or(StoreError::OutOfRange("index out of range"))?;
            list[i] = value;
            Ok(())
        })
    }

    /// LLEN key
    pub fn seq_len(&self, key: &[u8]) -> StoreResult<usize> {
        self.keyspace
            .view(key, |value, _| Ok(as_sequence(value)?.map_or(0, VecDeque::len)))
    }

    /// LREM key count element
    ///
    /// `count > 0` removes from the head, `count < 0` from the tail and
    /// `count == 0` removes every occurrence.
    pub fn remove_value(&self, key: &Bytes, count: i64, value: &[u8]) -> StoreResult<usize> {
        self.keyspace.update(key, |slot, _| {
            let Some(list) = sequence_mut(slot)? else {
                return Ok(0);
            };
            let limit = match count {
                0 => usize::MAX,
                n => usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX),
            };

            let len = list.len();
            let mut hits = 0;
            let mut doomed = vec![false; len];
            let positions: Box<dyn Iterator<Item = usize>> = if count < 0 {
                Box::new((0..len).rev())
            } else {
                Box::new(0..len)
            };
            for i in positions {
                if hits == limit {
                    break;
                }
                if list[i].as_ref() == value {
                    doomed[i] = true;
                    hits += 1;
                }
            }

            let mut i = 0;
            list.retain(|_| {
                let keep = !doomed[i];
                i += 1;
                keep
            });
            Ok(hits)
        })
    }

    /// LTRIM key start stop
    ///
    /// An empty range deletes the key. A missing key is left alone.
    pub fn trim(&self, key: &Bytes, start: i64, end: i64) -> StoreResult<()> {
        self.keyspace.update(key, |slot, _| {
            let Some(list) = sequence_mut(slot)? else {
                return Ok(());
            };
            match resolve_range(start, end, list.len()) {
                Some((from, to)) => {
                    list.truncate(to + 1);
                    list.drain(..from);
                }
                None => list.clear(),
            }
            Ok(())
        })
    }

    /// LMOVE source destination LEFT|RIGHT LEFT|RIGHT
    ///
    /// Pops from `source` and pushes onto `destination` atomically. With the
    /// same key on both sides this rotates the sequence.
    pub fn move_element(
        &self,
        source: &Bytes,
        destination: &Bytes,
        from: End,
        to: End,
    ) -> StoreResult<Option<Bytes>> {
        let keys = [source.clone(), destination.clone()];
        let moved = self.keyspace.update_many(&keys, |slots, _| {
            if let Some(entry) = slots.get(destination) {
                if entry.value.value_type() != ValueType::Sequence {
                    return Err(StoreError::WrongType);
                }
            }
            let Some(list) = sequence_mut(slots.slot_mut(source))? else {
                return Ok(None);
            };
            let Some(value) = pop_end(list, from) else {
                return Ok(None);
            };
            push_end(sequence_or_create(slots.slot_mut(destination))?, to, value.clone());
            Ok(Some(value))
        })?;

        if moved.is_some() {
            self.wake(destination, 1);
        }
        Ok(moved)
    }
}
