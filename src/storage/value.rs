//! Value Types
//!
//! The four structure types a key can hold. The set is closed: a command
//! written for one variant never silently coerces another, it reports
//! [`StoreError::WrongType`](crate::StoreError::WrongType) instead.
//!
//! | Variant     | Representation              | Notes                          |
//! |-------------|-----------------------------|--------------------------------|
//! | `Scalar`    | `Bytes`                     | parsed as i64/f64 on demand    |
//! | `FieldMap`  | `HashMap<Bytes, Field>`     | per-field optional expiry      |
//! | `Sequence`  | `VecDeque<Bytes>`           | O(1) push/pop at both ends     |
//! | `UniqueSet` | `HashSet<Bytes>`            | O(1) add/remove/membership     |

use bytes::Bytes;
use std::collections::hash_map;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::time::Instant;

use super::clock::is_past;

/// A value stored under a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Bytes),
    FieldMap(FieldMap),
    Sequence(VecDeque<Bytes>),
    UniqueSet(HashSet<Bytes>),
}

/// The structure type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Scalar,
    FieldMap,
    Sequence,
    UniqueSet,
}

impl ValueType {
    /// The conventional name reported by `TYPE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Scalar => "string",
            ValueType::FieldMap => "hash",
            ValueType::Sequence => "list",
            ValueType::UniqueSet => "set",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Scalar(_) => ValueType::Scalar,
            Value::FieldMap(_) => ValueType::FieldMap,
            Value::Sequence(_) => ValueType::Sequence,
            Value::UniqueSet(_) => ValueType::UniqueSet,
        }
    }

    /// Returns `true` for a collection with no elements.
    ///
    /// Empty collections are never stored; the keyspace deletes a key whose
    /// collection becomes empty. An empty scalar is a valid value.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::Scalar(_) => false,
            Value::FieldMap(map) => map.is_empty(),
            Value::Sequence(list) => list.is_empty(),
            Value::UniqueSet(set) => set.is_empty(),
        }
    }

    /// Returns `true` if this is a field map carrying at least one field TTL.
    pub(crate) fn has_field_expiry(&self) -> bool {
        matches!(self, Value::FieldMap(map) if map.has_expiring_fields())
    }

    /// Copies the value out, dropping any fields that have already expired.
    pub(crate) fn snapshot(&self, now: Instant) -> Value {
        match self {
            Value::FieldMap(map) => Value::FieldMap(map.live_copy(now)),
            other => other.clone(),
        }
    }
}

/// A single field of a [`FieldMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub value: Bytes,
    pub expires_at: Option<Instant>,
}

/// A map from field name to value with optional per-field expiry.
///
/// Reads take the current instant so that expired fields are invisible even
/// before they are physically purged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    fields: HashMap<Bytes, Field>,
    /// Number of fields with an expiry set.
    expiring: usize,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored fields, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_expiring_fields(&self) -> bool {
        self.expiring > 0
    }

    /// Returns the live field, if any.
    pub fn get(&self, field: &[u8], now: Instant) -> Option<&Field> {
        self.fields
            .get(field)
            .filter(|f| !is_past(f.expires_at, now))
    }

    /// Sets a field, clearing any expiry it had.
    ///
    /// Returns `true` if the field did not exist before.
    pub fn insert(&mut self, field: Bytes, value: Bytes) -> bool {
        let previous = self.fields.insert(
            field,
            Field {
                value,
                expires_at: None,
            },
        );
        match previous {
            Some(old) => {
                if old.expires_at.is_some() {
                    self.expiring -= 1;
                }
                false
            }
            None => true,
        }
    }

    /// Replaces the value of a field, keeping its expiry if it has one.
    pub fn replace_value(&mut self, field: Bytes, value: Bytes) {
        match self.fields.get_mut(&field) {
            Some(existing) => existing.value = value,
            None => {
                self.insert(field, value);
            }
        }
    }

    /// Removes a field. Returns `true` if it existed.
    pub fn remove(&mut self, field: &[u8]) -> bool {
        match self.fields.remove(field) {
            Some(old) => {
                if old.expires_at.is_some() {
                    self.expiring -= 1;
                }
                true
            }
            None => false,
        }
    }

    /// Sets or clears the expiry of an existing field.
    ///
    /// Returns `false` if the field does not exist.
    pub fn set_field_expiry(&mut self, field: &[u8], expires_at: Option<Instant>) -> bool {
        match self.fields.get_mut(field) {
            Some(f) => {
                match (f.expires_at.is_some(), expires_at.is_some()) {
                    (false, true) => self.expiring += 1,
                    (true, false) => self.expiring -= 1,
                    _ => {}
                }
                f.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    /// Physically drops expired fields and returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        if self.expiring == 0 {
            return 0;
        }
        let before = self.fields.len();
        self.fields.retain(|_, f| !is_past(f.expires_at, now));
        self.expiring = self.fields.values().filter(|f| f.expires_at.is_some()).count();
        before - self.fields.len()
    }

    /// Number of fields that have not expired.
    pub fn live_len(&self, now: Instant) -> usize {
        if self.expiring == 0 {
            return self.fields.len();
        }
        self.iter_live(now).count()
    }

    /// Iterates over fields that have not expired.
    pub fn iter_live(&self, now: Instant) -> impl Iterator<Item = (&Bytes, &Field)> {
        self.fields
            .iter()
            .filter(move |(_, f)| !is_past(f.expires_at, now))
    }

    /// Iterates over all stored fields.
    pub fn iter(&self) -> hash_map::Iter<'_, Bytes, Field> {
        self.fields.iter()
    }

    fn live_copy(&self, now: Instant) -> FieldMap {
        let mut copy = self.clone();
        copy.purge_expired(now);
        copy
    }
}

impl<K: Into<Bytes>, V: Into<Bytes>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert(k.into(), v.into());
        }
        map
    }
}

/// Resolves a possibly negative index against a length.
///
/// Returns `None` when the index falls outside `0..len`.
pub(crate) fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let actual = if index < 0 { len + index } else { index };
    if actual < 0 || actual >= len {
        None
    } else {
        Some(actual as usize)
    }
}

/// Resolves an inclusive `[start, end]` range with negative indices counted
/// from the end, clamping to the valid range.
///
/// Returns `None` when the range selects nothing.
pub(crate) fn resolve_range(start: i64, end: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut end = if end < 0 { len + end } else { end };

    if start < 0 {
        start = 0;
    }
    if end >= len {
        end = len - 1;
    }
    if start > end || start >= len || end < 0 {
        return None;
    }
    Some((start as usize, end as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_value_type_names() {
        assert_eq!(Value::Scalar(Bytes::new()).value_type().as_str(), "string");
        assert_eq!(ValueType::FieldMap.to_string(), "hash");
        assert_eq!(ValueType::Sequence.as_str(), "list");
        assert_eq!(ValueType::UniqueSet.as_str(), "set");
    }

    #[test]
    fn test_empty_collections() {
        assert!(!Value::Scalar(Bytes::new()).is_empty_collection());
        assert!(Value::Sequence(VecDeque::new()).is_empty_collection());
        assert!(Value::UniqueSet(HashSet::new()).is_empty_collection());
        assert!(Value::FieldMap(FieldMap::new()).is_empty_collection());
    }

    #[test]
    fn test_field_map_insert_reports_new() {
        let mut map = FieldMap::new();
        assert!(map.insert(Bytes::from("a"), Bytes::from("1")));
        assert!(!map.insert(Bytes::from("a"), Bytes::from("2")));
        let now = Instant::now();
        assert_eq!(map.get(b"a", now).unwrap().value, Bytes::from("2"));
    }

    #[test]
    fn test_field_expiry_hides_and_purges() {
        let now = Instant::now();
        let mut map: FieldMap = [("a", "1"), ("b", "2")].into_iter().collect();

        assert!(map.set_field_expiry(b"a", Some(now)));
        assert!(map.has_expiring_fields());
        assert!(map.get(b"a", now).is_none());
        assert_eq!(map.live_len(now), 1);
        assert_eq!(map.len(), 2);

        assert_eq!(map.purge_expired(now), 1);
        assert_eq!(map.len(), 1);
        assert!(!map.has_expiring_fields());
    }

    #[test]
    fn test_overwrite_clears_field_expiry() {
        let now = Instant::now();
        let mut map = FieldMap::new();
        map.insert(Bytes::from("a"), Bytes::from("1"));
        map.set_field_expiry(b"a", Some(now + Duration::from_secs(1)));
        map.insert(Bytes::from("a"), Bytes::from("2"));
        assert!(!map.has_expiring_fields());
        assert_eq!(map.get(b"a", now).unwrap().expires_at, None);
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(0, 3), Some(0));
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(-3, 3), Some(0));
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(-4, 3), None);
        assert_eq!(resolve_index(0, 0), None);
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(0, -1, 5), Some((0, 4)));
        assert_eq!(resolve_range(-3, -1, 5), Some((2, 4)));
        assert_eq!(resolve_range(0, 100, 5), Some((0, 4)));
        assert_eq!(resolve_range(-100, 1, 5), Some((0, 1)));
        assert_eq!(resolve_range(3, 1, 5), None);
        assert_eq!(resolve_range(5, 10, 5), None);
        assert_eq!(resolve_range(0, -10, 5), None);
        assert_eq!(resolve_range(0, -1, 0), None);
    }
}
