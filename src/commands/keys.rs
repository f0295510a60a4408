//! Key commands: work on any structure type.

use bytes::Bytes;

use super::handler::{require_args, CommandExecutor};
use crate::error::{StoreError, StoreResult};
use crate::storage::{Expiry, Ttl, Value, ValueType};

impl CommandExecutor {
    /// DEL key [key ...]
    pub fn delete(&self, keys: &[Bytes]) -> StoreResult<u64> {
        require_args(keys, "del")?;
        Ok(self.keyspace.remove_many(keys))
    }

    /// EXISTS key [key ...]
    ///
    /// A key named twice is counted twice.
    pub fn exists(&self, keys: &[Bytes]) -> StoreResult<u64> {
        require_args(keys, "exists")?;
        Ok(self.keyspace.exists_many(keys))
    }

    /// EXPIRE / PEXPIRE / EXPIREAT / PEXPIREAT key
    ///
    /// A deadline that is already due deletes the key.
    pub fn expire(&self, key: &Bytes, expiry: Expiry) -> StoreResult<bool> {
        self.keyspace.set_expiry(key, expiry)
    }

    /// PERSIST key
    pub fn persist(&self, key: &Bytes) -> bool {
        self.keyspace.persist(key)
    }

    /// PTTL key
    pub fn ttl(&self, key: &[u8]) -> Ttl {
        self.keyspace.ttl(key)
    }

    /// TYPE key
    pub fn key_type(&self, key: &[u8]) -> Option<ValueType> {
        self.keyspace.key_type(key)
    }

    /// RENAME key newkey
    ///
    /// Moves the value and its deadline, replacing whatever `new_key` held.
    pub fn rename(&self, key: &Bytes, new_key: &Bytes) -> StoreResult<()> {
        self.rename_with(key, new_key, false).map(|_| ())
    }

    /// RENAMENX key newkey
    ///
    /// Returns `false`, and changes nothing, if `new_key` already exists.
    pub fn rename_if_absent(&self, key: &Bytes, new_key: &Bytes) -> StoreResult<bool> {
        self.rename_with(key, new_key, true)
    }

    fn rename_with(&self, key: &Bytes, new_key: &Bytes, only_if_absent: bool) -> StoreResult<bool> {
        let keys = [key.clone(), new_key.clone()];
        let moved = self.keyspace.update_many(&keys, |slots, _| {
            if slots.get(key).is_none() {
                return Err(StoreError::NoSuchKey);
            }
            if key == new_key {
                return Ok(None);
            }
            if only_if_absent && slots.get(new_key).is_some() {
                return Ok(None);
            }
            let entry = slots.take(key);
            let waiting = match &entry {
                Some(e) => match &e.value {
                    Value::Sequence(list) => list.len(),
                    _ => 0,
                },
                None => 0,
            };
            *slots.slot_mut(new_key) = entry;
            Ok(Some(waiting))
        })?;

        match moved {
            Some(added) => {
                self.wake(new_key, added);
                Ok(true)
            }
            None => Ok(key == new_key && !only_if_absent),
        }
    }

    /// KEYS pattern
    pub fn keys(&self, pattern: &str) -> Vec<Bytes> {
        self.keyspace.keys(pattern)
    }

    /// SCAN cursor [MATCH pattern] [COUNT count]
    pub fn scan(&self, cursor: u64, count: usize, pattern: Option<&str>) -> (u64, Vec<Bytes>) {
        self.keyspace.scan(cursor, count, pattern)
    }

    /// DBSIZE
    pub fn dbsize(&self) -> u64 {
        self.keyspace.len()
    }

    /// FLUSHDB
    pub fn flush(&self) {
        self.keyspace.flush();
    }
}
