//! Scalar commands.

use bytes::{Bytes, BytesMut};
use std::time::Duration;

use super::command::{SetCondition, SetOptions, SetOutcome};
use super::handler::{as_scalar, require_args, scalar_mut, CommandExecutor};
use crate::error::{StoreError, StoreResult};
use crate::storage::value::resolve_range;
use crate::storage::{Entry, Expiry, Value};

/// Largest scalar `SETRANGE` may produce.
pub const MAX_SCALAR_LEN: usize = 512 * 1024 * 1024;

/// Parses scalar bytes as a signed 64-bit integer.
pub(super) fn parse_int(bytes: &[u8]) -> StoreResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(StoreError::NotANumber)
}

/// Parses scalar bytes as a float. NaN is never a valid stored number.
pub(super) fn parse_float(bytes: &[u8]) -> StoreResult<f64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or(StoreError::NotAFloat)
}

/// Applies a float delta. Overflow to infinity is allowed, NaN is not.
pub(super) fn add_float(current: f64, delta: f64) -> StoreResult<f64> {
    if delta.is_nan() {
        return Err(StoreError::NotAFloat);
    }
    let result = current + delta;
    if result.is_nan() {
        return Err(StoreError::NotAFloat);
    }
    Ok(result)
}

pub(super) fn overflow() -> StoreError {
    StoreError::OutOfRange("increment or decrement would overflow")
}

/// Rejects a relative expiry of zero length.
pub(super) fn check_expiry(expiry: &Expiry) -> StoreResult<()> {
    match expiry {
        Expiry::In(ttl) if *ttl == Duration::ZERO => {
            Err(StoreError::OutOfRange("invalid expire time"))
        }
        _ => Ok(()),
    }
}

/// Writes a scalar into a slot already known to be empty or scalar,
/// keeping the existing deadline.
fn store_scalar(slot: &mut Option<Entry>, value: Bytes) {
    match slot {
        Some(entry) => entry.value = Value::Scalar(value),
        None => *slot = Some(Entry::new(Value::Scalar(value))),
    }
}

impl CommandExecutor {
    /// GET key
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Bytes>> {
        self.keyspace
            .view(key, |value, _| as_scalar(value).map(|v| v.cloned()))
    }

    /// SET key value [NX|XX] [EX|PX|EXAT|PXAT] [KEEPTTL] [GET]
    ///
    /// Overwrites a key of any type unless `get` is requested, in which case
    /// a non-scalar old value is a `WrongType` error and nothing is written.
    pub fn set(&self, key: Bytes, value: Bytes, options: SetOptions) -> StoreResult<SetOutcome> {
        if let Some(expiry) = &options.expiry {
            check_expiry(expiry)?;
        }
        let deadline = options
            .expiry
            .map(|expiry| expiry.deadline(self.keyspace.clock()))
            .transpose()?;

        self.keyspace.update(&key, |slot, now| {
            let previous = if options.get {
                as_scalar(slot.as_ref().map(|e| &e.value))?.cloned()
            } else {
                None
            };

            let blocked = match options.condition {
                SetCondition::Always => false,
                SetCondition::IfAbsent => slot.is_some(),
                SetCondition::IfPresent => slot.is_none(),
            };
            if blocked {
                return Ok(SetOutcome {
                    written: false,
                    previous,
                });
            }

            let expires_at = match deadline {
                Some(at) => Some(at),
                None if options.keep_ttl => slot.as_ref().and_then(|e| e.expires_at),
                None => None,
            };
            *slot = match expires_at {
                Some(at) if at <= now => None,
                Some(at) => Some(Entry::with_deadline(Value::Scalar(value), at)),
                None => Some(Entry::new(Value::Scalar(value))),
            };

            Ok(SetOutcome {
                written: true,
                previous,
            })
        })
    }

    /// GETDEL key
    pub fn get_del(&self, key: &Bytes) -> StoreResult<Option<Bytes>> {
        self.keyspace.update(key, |slot, _| {
            let value = as_scalar(slot.as_ref().map(|e| &e.value))?.cloned();
            if value.is_some() {
                *slot = None;
            }
            Ok(value)
        })
    }

    /// MGET key [key ...]
    ///
    /// Keys that are absent or hold another type read as `None`.
    pub fn mget(&self, keys: &[Bytes]) -> StoreResult<Vec<Option<Bytes>>> {
        require_args(keys, "mget")?;
        Ok(keys
            .iter()
            .map(|key| {
                self.keyspace
                    .view(key, |value, _| as_scalar(value).ok().flatten().cloned())
            })
            .collect())
    }

    /// MSET key value [key value ...]
    ///
    /// All pairs become visible together. A repeated key keeps its last value.
    pub fn mset(&self, pairs: Vec<(Bytes, Bytes)>) -> StoreResult<()> {
        require_args(&pairs, "mset")?;
        let keys: Vec<Bytes> = pairs.iter().map(|(k, _)| k.clone()).collect();
        self.keyspace.update_many(&keys, |slots, _| {
            for (key, value) in pairs {
                *slots.slot_mut(&key) = Some(Entry::new(Value::Scalar(value)));
            }
        });
        Ok(())
    }

    /// INCR key
    pub fn incr(&self, key: &Bytes) -> StoreResult<i64> {
        self.incr_by(key, 1)
    }

    /// DECR key
    pub fn decr(&self, key: &Bytes) -> StoreResult<i64> {
        self.incr_by(key, -1)
    }

    /// DECRBY key decrement
    pub fn decr_by(&self, key: &Bytes, delta: i64) -> StoreResult<i64> {
        let delta = delta.checked_neg().ok_or_else(overflow)?;
        self.incr_by(key, delta)
    }

    /// INCRBY key increment
    ///
    /// An absent key counts as `0`. The deadline of an existing key is kept.
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> StoreResult<i64> {
        self.keyspace.update(key, |slot, _| {
            let current = match scalar_mut(slot)? {
                Some(entry) => match &entry.value {
                    Value::Scalar(bytes) => parse_int(bytes)?,
                    _ => return Err(StoreError::WrongType),
                },
                None => 0,
            };
            let updated = current.checked_add(delta).ok_or_else(overflow)?;
            store_scalar(slot, Bytes::from(updated.to_string()));
            Ok(updated)
        })
    }

    /// INCRBYFLOAT key increment
    pub fn incr_by_float(&self, key: &Bytes, delta: f64) -> StoreResult<f64> {
        self.keyspace.update(key, |slot, _| {
            let current = match scalar_mut(slot)? {
                Some(entry) => match &entry.value {
                    Value::Scalar(bytes) => parse_float(bytes)?,
                    _ => return Err(StoreError::WrongType),
                },
                None => 0.0,
            };
            let updated = add_float(current, delta)?;
            store_scalar(slot, Bytes::from(updated.to_string()));
            Ok(updated)
        })
    }

    /// APPEND key value
    ///
    /// Returns the length after the append.
    pub fn append(&self, key: &Bytes, value: &[u8]) -> StoreResult<usize> {
        self.keyspace.update(key, |slot, _| match scalar_mut(slot)? {
            Some(entry) => {
                let Value::Scalar(existing) = &entry.value else {
                    return Err(StoreError::WrongType);
                };
                let mut joined = BytesMut::with_capacity(existing.len() + value.len());
                joined.extend_from_slice(existing);
                joined.extend_from_slice(value);
                let len = joined.len();
                entry.value = Value::Scalar(joined.freeze());
                Ok(len)
            }
            None => {
                *slot = Some(Entry::new(Value::Scalar(Bytes::copy_from_slice(value))));
                Ok(value.len())
            }
        })
    }

    /// STRLEN key
    pub fn strlen(&self, key: &[u8]) -> StoreResult<usize> {
        self.keyspace
            .view(key, |value, _| Ok(as_scalar(value)?.map_or(0, Bytes::len)))
    }

    /// GETRANGE key start end
    ///
    /// Inclusive on both ends; negative offsets count from the end.
    pub fn get_range(&self, key: &[u8], start: i64, end: i64) -> StoreResult<Bytes> {
        self.keyspace.view(key, |value, _| {
            let Some(bytes) = as_scalar(value)? else {
                return Ok(Bytes::new());
            };
            Ok(match resolve_range(start, end, bytes.len()) {
                Some((from, to)) => bytes.slice(from..=to),
                None => Bytes::new(),
            })
        })
    }

    /// SETRANGE key offset value
    ///
    /// Overwrites from `offset`, zero-padding a short or absent value.
    /// Returns the length afterwards. An empty `value` never creates a key.
    pub fn set_range(&self, key: &Bytes, offset: usize, value: &[u8]) -> StoreResult<usize> {
        let required = offset
            .checked_add(value.len())
            .filter(|len| *len <= MAX_SCALAR_LEN)
            .ok_or(StoreError::OutOfRange("string exceeds maximum allowed size"))?;

        self.keyspace.update(key, |slot, _| {
            let existing = match scalar_mut(slot)? {
                Some(Entry {
                    value: Value::Scalar(bytes),
                    ..
                }) => bytes.clone(),
                Some(_) => return Err(StoreError::WrongType),
                None => Bytes::new(),
            };
            if value.is_empty() {
                return Ok(existing.len());
            }

            let mut buf = BytesMut::from(existing.as_ref());
            if buf.len() < required {
                buf.resize(required, 0);
            }
            buf[offset..required].copy_from_slice(value);
            let len = buf.len();
            store_scalar(slot, buf.freeze());
            Ok(len)
        })
    }
}
