//! Field map commands.
//!
//! Expired fields are invisible: reads filter them against the instant the
//! keyspace hands to the closure, and writes never see them because the
//! keyspace purges a field map's expired fields before handing out its slot.

use bytes::Bytes;

use super::command::{FieldExpireStatus, FieldPersistStatus};
use super::handler::{
    as_field_map, field_map_mut, field_map_or_create, require_args, CommandExecutor,
};
use super::scalar::{add_float, overflow, parse_float, parse_int};
use crate::error::StoreResult;
use crate::storage::{Expiry, Ttl};

impl CommandExecutor {
    /// HSET key field value [field value ...]
    ///
    /// All fields are written together. Returns the number of new fields.
    pub fn set_fields(&self, key: &Bytes, fields: Vec<(Bytes, Bytes)>) -> StoreResult<usize> {
        require_args(&fields, "hset")?;
        self.keyspace.update(key, |slot, _| {
            let map = field_map_or_create(slot)?;
            Ok(fields
                .into_iter()
                .map(|(field, value)| map.insert(field, value))
                .filter(|created| *created)
                .count())
        })
    }

    /// HSETNX key field value
    pub fn set_field_if_absent(
        &self,
        key: &Bytes,
        field: Bytes,
        value: Bytes,
    ) -> StoreResult<bool> {
        self.keyspace.update(key, |slot, now| {
            let map = field_map_or_create(slot)?;
            if map.get(&field, now).is_some() {
                return Ok(false);
            }
            map.insert(field, value);
            Ok(true)
        })
    }

    /// HGET key field
    pub fn get_field(&self, key: &[u8], field: &[u8]) -> StoreResult<Option<Bytes>> {
        self.keyspace.view(key, |value, now| {
            Ok(as_field_map(value)?
                .and_then(|map| map.get(field, now))
                .map(|f| f.value.clone()))
        })
    }

    /// HMGET key field [field ...]
    ///
    /// An absent key reads as all fields absent.
    pub fn get_fields(&self, key: &[u8], fields: &[Bytes]) -> StoreResult<Vec<Option<Bytes>>> {
        require_args(fields, "hmget")?;
        self.keyspace.view(key, |value, now| {
            let map = as_field_map(value)?;
            Ok(fields
                .iter()
                .map(|field| {
                    map.and_then(|m| m.get(field, now))
                        .map(|f| f.value.clone())
                })
                .collect())
        })
    }

    /// HGETALL key
    pub fn get_all_fields(&self, key: &[u8]) -> StoreResult<Vec<(Bytes, Bytes)>> {
        self.keyspace.view(key, |value, now| {
            Ok(as_field_map(value)?
                .map(|map| {
                    map.iter_live(now)
                        .map(|(name, f)| (name.clone(), f.value.clone()))
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    /// HKEYS key
    pub fn field_names(&self, key: &[u8]) -> StoreResult<Vec<Bytes>> {
        self.keyspace.view(key, |value, now| {
            Ok(as_field_map(value)?
                .map(|map| map.iter_live(now).map(|(name, _)| name.clone()).collect())
                .unwrap_or_default())
        })
    }

    /// HVALS key
    pub fn field_values(&self, key: &[u8]) -> StoreResult<Vec<Bytes>> {
        self.keyspace.view(key, |value, now| {
            Ok(as_field_map(value)?
                .map(|map| map.iter_live(now).map(|(_, f)| f.value.clone()).collect())
                .unwrap_or_default())
        })
    }

    /// HLEN key
    pub fn field_len(&self, key: &[u8]) -> StoreResult<usize> {
        self.keyspace.view(key, |value, now| {
            Ok(as_field_map(value)?.map_or(0, |map| map.live_len(now)))
        })
    }

    /// HEXISTS key field
    pub fn field_exists(&self, key: &[u8], field: &[u8]) -> StoreResult<bool> {
        self.keyspace.view(key, |value, now| {
            Ok(as_field_map(value)?.is_some_and(|map| map.get(field, now).is_some()))
        })
    }

    /// HDEL key field [field ...]
    ///
    /// Deleting the last field deletes the key.
    pub fn delete_fields(&self, key: &Bytes, fields: &[Bytes]) -> StoreResult<usize> {
        require_args(fields, "hdel")?;
        self.keyspace.update(key, |slot, _| {
            let Some(map) = field_map_mut(slot)? else {
                return Ok(0);
            };
            Ok(fields.iter().filter(|field| map.remove(field)).count())
        })
    }

    /// HINCRBY key field increment
    ///
    /// The field keeps its deadline, if it has one.
    pub fn incr_field_by(&self, key: &Bytes, field: Bytes, delta: i64) -> StoreResult<i64> {
        self.keyspace.update(key, |slot, now| {
            let current = match field_map_mut(slot)?.and_then(|map| map.get(&field, now)) {
                Some(f) => parse_int(&f.value)?,
                None => 0,
            };
            let updated = current.checked_add(delta).ok_or_else(overflow)?;
            field_map_or_create(slot)?.replace_value(field, Bytes::from(updated.to_string()));
            Ok(updated)
        })
    }

    /// HINCRBYFLOAT key field increment
    pub fn incr_field_by_float(&self, key: &Bytes, field: Bytes, delta: f64) -> StoreResult<f64> {
        self.keyspace.update(key, |slot, now| {
            let current = match field_map_mut(slot)?.and_then(|map| map.get(&field, now)) {
                Some(f) => parse_float(&f.value)?,
                None => 0.0,
            };
            let updated = add_float(current, delta)?;
            field_map_or_create(slot)?.replace_value(field, Bytes::from(updated.to_string()));
            Ok(updated)
        })
    }

    /// HPEXPIRE key milliseconds FIELDS numfields field [field ...]
    ///
    /// A deadline that is already due deletes the field.
    pub fn expire_fields(
        &self,
        key: &Bytes,
        expiry: Expiry,
        fields: &[Bytes],
    ) -> StoreResult<Vec<FieldExpireStatus>> {
        require_args(fields, "hpexpire")?;
        let deadline = expiry.deadline(self.keyspace.clock())?;

        self.keyspace.update(key, |slot, now| {
            let Some(map) = field_map_mut(slot)? else {
                return Ok(vec![FieldExpireStatus::NoSuchField; fields.len()]);
            };
            Ok(fields
                .iter()
                .map(|field| {
                    if map.get(field, now).is_none() {
                        FieldExpireStatus::NoSuchField
                    } else if deadline <= now {
                        map.remove(field);
                        FieldExpireStatus::Deleted
                    } else {
                        map.set_field_expiry(field, Some(deadline));
                        FieldExpireStatus::Set
                    }
                })
                .collect())
        })
    }

    /// HPTTL key FIELDS numfields field [field ...]
    pub fn field_ttl(&self, key: &[u8], fields: &[Bytes]) -> StoreResult<Vec<Ttl>> {
        require_args(fields, "hpttl")?;
        self.keyspace.view(key, |value, now| {
            let map = as_field_map(value)?;
            Ok(fields
                .iter()
                .map(|field| match map.and_then(|m| m.get(field, now)) {
                    None => Ttl::Absent,
                    Some(f) => match f.expires_at {
                        Some(at) => Ttl::Remaining(at.saturating_duration_since(now)),
                        None => Ttl::NoExpiry,
                    },
                })
                .collect())
        })
    }

    /// HPERSIST key FIELDS numfields field [field ...]
    pub fn persist_fields(
        &self,
        key: &Bytes,
        fields: &[Bytes],
    ) -> StoreResult<Vec<FieldPersistStatus>> {
        require_args(fields, "hpersist")?;
        self.keyspace.update(key, |slot, now| {
            let Some(map) = field_map_mut(slot)? else {
                return Ok(vec![FieldPersistStatus::NoSuchField; fields.len()]);
            };
            Ok(fields
                .iter()
                .map(|field| match map.get(field, now).map(|f| f.expires_at) {
                    None => FieldPersistStatus::NoSuchField,
                    Some(None) => FieldPersistStatus::NoExpiry,
                    Some(Some(_)) => {
                        map.set_field_expiry(field, None);
                        FieldPersistStatus::Persisted
                    }
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::storage::{Keyspace, ManualClock, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(Bytes, Bytes)> {
        items.iter().map(|(f, v)| (b(f), b(v))).collect()
    }

    fn manual() -> (Arc<ManualClock>, CommandExecutor) {
        let clock = Arc::new(ManualClock::new());
        let exec = CommandExecutor::new(Arc::new(Keyspace::with_clock(4, clock.clone())));
        (clock, exec)
    }

    #[test]
    fn test_set_fields_counts_new() {
        let (_, exec) = manual();
        let key = b("h");
        assert_eq!(exec.set_fields(&key, pairs(&[("a", "1"), ("b", "2")])), Ok(2));
        assert_eq!(exec.set_fields(&key, pairs(&[("a", "3"), ("c", "4")])), Ok(1));
        assert_eq!(exec.get_field(b"h", b"a"), Ok(Some(b("3"))));
        assert_eq!(exec.field_len(b"h"), Ok(3));
    }

    #[test]
    fn test_set_fields_wrong_type_writes_nothing() {
        let (_, exec) = manual();
        exec.keyspace().insert(b("s"), Value::Scalar(b("v")));
        assert_eq!(
            exec.set_fields(&b("s"), pairs(&[("a", "1")])),
            Err(StoreError::WrongType)
        );
        assert_eq!(
            exec.keyspace().lookup(b"s", crate::storage::ValueType::Scalar),
            Ok(Some(Value::Scalar(b("v"))))
        );
    }

    #[test]
    fn test_get_fields_on_absent_key() {
        let (_, exec) = manual();
        assert_eq!(
            exec.get_fields(b"nothing", &[b("a"), b("b")]),
            Ok(vec![None, None])
        );
        assert!(matches!(
            exec.get_fields(b"nothing", &[]),
            Err(StoreError::WrongArity(_))
        ));
    }

    #[test]
    fn test_set_field_if_absent() {
        let (_, exec) = manual();
        assert_eq!(exec.set_field_if_absent(&b("h"), b("f"), b("1")), Ok(true));
        assert_eq!(exec.set_field_if_absent(&b("h"), b("f"), b("2")), Ok(false));
        assert_eq!(exec.get_field(b"h", b"f"), Ok(Some(b("1"))));
    }

    #[test]
    fn test_names_values_all() {
        let (_, exec) = manual();
        exec.set_fields(&b("h"), pairs(&[("a", "1"), ("b", "2")]))
            .unwrap();

        let mut names = exec.field_names(b"h").unwrap();
        names.sort();
        assert_eq!(names, vec![b("a"), b("b")]);

        let mut values = exec.field_values(b"h").unwrap();
        values.sort();
        assert_eq!(values, vec![b("1"), b("2")]);

        let mut all = exec.get_all_fields(b"h").unwrap();
        all.sort();
        assert_eq!(all, pairs(&[("a", "1"), ("b", "2")]));
        assert_eq!(exec.get_all_fields(b"missing"), Ok(vec![]));
    }

    #[test]
    fn test_delete_last_field_deletes_key() {
        let (_, exec) = manual();
        exec.set_fields(&b("h"), pairs(&[("a", "1"), ("b", "2")]))
            .unwrap();
        assert_eq!(exec.delete_fields(&b("h"), &[b("a"), b("x")]), Ok(1));
        assert!(exec.field_exists(b"h", b"b").unwrap());
        assert_eq!(exec.delete_fields(&b("h"), &[b("b")]), Ok(1));
        assert!(!exec.keyspace().exists(b"h"));
    }

    #[test]
    fn test_incr_field() {
        let (_, exec) = manual();
        assert_eq!(exec.incr_field_by(&b("h"), b("n"), 5), Ok(5));
        assert_eq!(exec.incr_field_by(&b("h"), b("n"), -2), Ok(3));
        assert_eq!(exec.incr_field_by_float(&b("h"), b("f"), 1.5), Ok(1.5));

        exec.set_fields(&b("h"), pairs(&[("s", "text")])).unwrap();
        assert_eq!(
            exec.incr_field_by(&b("h"), b("s"), 1),
            Err(StoreError::NotANumber)
        );

        exec.set_fields(&b("h"), vec![(b("max"), Bytes::from(i64::MAX.to_string()))])
            .unwrap();
        assert!(matches!(
            exec.incr_field_by(&b("h"), b("max"), 1),
            Err(StoreError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_field_expiry_lifecycle() {
        let (clock, exec) = manual();
        let key = b("h");
        exec.set_fields(&key, pairs(&[("a", "1"), ("b", "2")]))
            .unwrap();

        let status = exec
            .expire_fields(&key, Expiry::secs(10), &[b("a"), b("missing")])
            .unwrap();
        assert_eq!(status, vec![FieldExpireStatus::Set, FieldExpireStatus::NoSuchField]);

        let ttls = exec.field_ttl(b"h", &[b("a"), b("b"), b("missing")]).unwrap();
        assert_eq!(
            ttls,
            vec![
                Ttl::Remaining(Duration::from_secs(10)),
                Ttl::NoExpiry,
                Ttl::Absent
            ]
        );

        clock.advance(Duration::from_secs(10));
        assert_eq!(exec.get_field(b"h", b"a"), Ok(None));
        assert_eq!(exec.field_len(b"h"), Ok(1));
        assert!(exec.keyspace().exists(b"h"));
    }

    #[test]
    fn test_all_fields_expiring_removes_key() {
        let (clock, exec) = manual();
        exec.set_fields(&b("h"), pairs(&[("a", "1")])).unwrap();
        exec.expire_fields(&b("h"), Expiry::millis(5), &[b("a")])
            .unwrap();

        clock.advance(Duration::from_millis(5));
        assert!(!exec.keyspace().exists(b"h"));
        assert_eq!(exec.field_len(b"h"), Ok(0));
    }

    #[test]
    fn test_expire_field_in_past_deletes() {
        let (_, exec) = manual();
        exec.set_fields(&b("h"), pairs(&[("a", "1"), ("b", "2")]))
            .unwrap();
        let past = exec.keyspace().now() - Duration::from_secs(1);
        let status = exec.expire_fields(&b("h"), Expiry::At(past), &[b("a")]).unwrap();
        assert_eq!(status, vec![FieldExpireStatus::Deleted]);
        assert_eq!(exec.field_len(b"h"), Ok(1));
    }

    #[test]
    fn test_expire_field_unrepresentable_deadline() {
        let (_, exec) = manual();
        exec.set_fields(&b("h"), pairs(&[("a", "1")])).unwrap();
        let result = exec.expire_fields(&b("h"), Expiry::In(Duration::MAX), &[b("a")]);
        assert!(matches!(result, Err(StoreError::OutOfRange(_))));
        assert_eq!(exec.field_ttl(b"h", &[b("a")]), Ok(vec![Ttl::NoExpiry]));
    }

    #[test]
    fn test_overwrite_and_persist_clear_field_ttl() {
        let (_, exec) = manual();
        let key = b("h");
        exec.set_fields(&key, pairs(&[("a", "1"), ("b", "2")]))
            .unwrap();
        exec.expire_fields(&key, Expiry::secs(10), &[b("a"), b("b")])
            .unwrap();

        exec.set_fields(&key, pairs(&[("a", "new")])).unwrap();
        assert_eq!(exec.field_ttl(b"h", &[b("a")]), Ok(vec![Ttl::NoExpiry]));

        let status = exec.persist_fields(&key, &[b("a"), b("b"), b("c")]).unwrap();
        assert_eq!(
            status,
            vec![
                FieldPersistStatus::NoExpiry,
                FieldPersistStatus::Persisted,
                FieldPersistStatus::NoSuchField
            ]
        );
        assert_eq!(exec.field_ttl(b"h", &[b("b")]), Ok(vec![Ttl::NoExpiry]));
    }

    #[test]
    fn test_incr_field_keeps_field_ttl() {
        let (_, exec) = manual();
        exec.set_fields(&b("h"), pairs(&[("n", "1")])).unwrap();
        exec.expire_fields(&b("h"), Expiry::secs(10), &[b("n")])
            .unwrap();
        exec.incr_field_by(&b("h"), b("n"), 1).unwrap();
        assert_eq!(
            exec.field_ttl(b"h", &[b("n")]),
            Ok(vec![Ttl::Remaining(Duration::from_secs(10))])
        );
    }
}
