//! Typed commands and replies.
//!
//! This is the boundary a transport layer talks to. A transport parses its
//! wire format into a [`Command`], hands it to
//! [`CommandExecutor::execute`](super::CommandExecutor::execute), and encodes
//! the [`Reply`] (or [`StoreError`](crate::StoreError)) back. Every variadic
//! argument is a typed list; minimum arity is checked by the executor before
//! the keyspace is touched.

use bytes::Bytes;
use std::time::Duration;

use crate::storage::{CancelToken, Expiry};

/// Which end of a sequence an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Left,
    Right,
}

/// Precondition for a scalar write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    #[default]
    Always,
    /// Only write if the key does not exist (`NX`).
    IfAbsent,
    /// Only write if the key exists (`XX`).
    IfPresent,
}

/// Options for [`CommandExecutor::set`](super::CommandExecutor::set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptions {
    pub condition: SetCondition,
    /// Expiry for the new value. Without it the key becomes persistent
    /// unless `keep_ttl` is set.
    pub expiry: Option<Expiry>,
    /// Keep the deadline of the value being replaced.
    pub keep_ttl: bool,
    /// Return the previous value.
    pub get: bool,
}

impl SetOptions {
    pub fn if_absent() -> Self {
        Self {
            condition: SetCondition::IfAbsent,
            ..Default::default()
        }
    }

    pub fn if_present() -> Self {
        Self {
            condition: SetCondition::IfPresent,
            ..Default::default()
        }
    }

    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_get(mut self) -> Self {
        self.get = true;
        self
    }

    pub fn keep_ttl(mut self) -> Self {
        self.keep_ttl = true;
        self
    }
}

/// What a scalar write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    /// `false` if the condition was not met and nothing was written.
    pub written: bool,
    /// The previous value, when requested with `get`.
    pub previous: Option<Bytes>,
}

/// Per-field result of an expire-fields call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldExpireStatus {
    /// The field (or the key) does not exist.
    NoSuchField,
    /// The deadline was set.
    Set,
    /// The deadline was already due, so the field was deleted.
    Deleted,
}

impl FieldExpireStatus {
    /// Conventional integer code: `-2`, `1` or `2`.
    pub fn code(&self) -> i64 {
        match self {
            FieldExpireStatus::NoSuchField => -2,
            FieldExpireStatus::Set => 1,
            FieldExpireStatus::Deleted => 2,
        }
    }
}

/// Per-field result of a persist-fields call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPersistStatus {
    NoSuchField,
    /// The field exists but had no deadline.
    NoExpiry,
    Persisted,
}

impl FieldPersistStatus {
    /// Conventional integer code: `-2`, `-1` or `1`.
    pub fn code(&self) -> i64 {
        match self {
            FieldPersistStatus::NoSuchField => -2,
            FieldPersistStatus::NoExpiry => -1,
            FieldPersistStatus::Persisted => 1,
        }
    }
}

/// A command for the engine.
#[derive(Debug, Clone)]
pub enum Command {
    // Scalar commands
    Get { key: Bytes },
    Set { key: Bytes, value: Bytes, options: SetOptions },
    GetDel { key: Bytes },
    MultiGet { keys: Vec<Bytes> },
    MultiSet { pairs: Vec<(Bytes, Bytes)> },
    IncrBy { key: Bytes, delta: i64 },
    IncrByFloat { key: Bytes, delta: f64 },
    Append { key: Bytes, value: Bytes },
    StrLen { key: Bytes },
    GetRange { key: Bytes, start: i64, end: i64 },
    SetRange { key: Bytes, offset: usize, value: Bytes },

    // Field map commands
    SetFields { key: Bytes, fields: Vec<(Bytes, Bytes)> },
    SetFieldIfAbsent { key: Bytes, field: Bytes, value: Bytes },
    GetFields { key: Bytes, fields: Vec<Bytes> },
    GetAllFields { key: Bytes },
    FieldNames { key: Bytes },
    FieldValues { key: Bytes },
    FieldLen { key: Bytes },
    FieldExists { key: Bytes, field: Bytes },
    DeleteFields { key: Bytes, fields: Vec<Bytes> },
    IncrFieldBy { key: Bytes, field: Bytes, delta: i64 },
    IncrFieldByFloat { key: Bytes, field: Bytes, delta: f64 },
    ExpireFields { key: Bytes, expiry: Expiry, fields: Vec<Bytes> },
    FieldTtl { key: Bytes, fields: Vec<Bytes> },
    PersistFields { key: Bytes, fields: Vec<Bytes> },

    // Sequence commands
    Push { key: Bytes, end: End, values: Vec<Bytes> },
    PushExisting { key: Bytes, end: End, values: Vec<Bytes> },
    Pop { key: Bytes, end: End, count: usize },
    Range { key: Bytes, start: i64, end: i64 },
    Index { key: Bytes, index: i64 },
    SetIndex { key: Bytes, index: i64, value: Bytes },
    SeqLen { key: Bytes },
    RemoveValue { key: Bytes, count: i64, value: Bytes },
    Trim { key: Bytes, start: i64, end: i64 },
    Move { source: Bytes, destination: Bytes, from: End, to: End },
    BlockingPop {
        keys: Vec<Bytes>,
        end: End,
        timeout: Duration,
        cancel: Option<CancelToken>,
    },
    BlockingMove {
        source: Bytes,
        destination: Bytes,
        from: End,
        to: End,
        timeout: Duration,
        cancel: Option<CancelToken>,
    },

    // Unique set commands
    Add { key: Bytes, members: Vec<Bytes> },
    Remove { key: Bytes, members: Vec<Bytes> },
    IsMember { key: Bytes, member: Bytes },
    Members { key: Bytes },
    Cardinality { key: Bytes },
    Intersect { keys: Vec<Bytes> },
    Union { keys: Vec<Bytes> },
    Difference { keys: Vec<Bytes> },
    IntersectStore { destination: Bytes, keys: Vec<Bytes> },
    UnionStore { destination: Bytes, keys: Vec<Bytes> },
    DifferenceStore { destination: Bytes, keys: Vec<Bytes> },
    RandomMembers { key: Bytes, count: i64 },
    PopMembers { key: Bytes, count: usize },
    MoveMember { source: Bytes, destination: Bytes, member: Bytes },

    // Key commands
    Delete { keys: Vec<Bytes> },
    Exists { keys: Vec<Bytes> },
    Expire { key: Bytes, expiry: Expiry },
    Persist { key: Bytes },
    Ttl { key: Bytes },
    Type { key: Bytes },
    Rename { key: Bytes, new_key: Bytes },
    RenameIfAbsent { key: Bytes, new_key: Bytes },
    Keys { pattern: String },
    Scan { cursor: u64, count: usize, pattern: Option<String> },
    DbSize,
    Flush,
}

/// A command result.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    /// No value (absent key, unmet condition, timed-out wait).
    Nil,
    Integer(i64),
    Float(f64),
    Bool(bool),
    Bulk(Bytes),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    pub fn integer(n: impl TryInto<i64>) -> Self {
        Reply::Integer(n.try_into().unwrap_or(i64::MAX))
    }

    /// `Bulk` for `Some`, `Nil` for `None`.
    pub fn optional(value: Option<Bytes>) -> Self {
        value.map_or(Reply::Nil, Reply::Bulk)
    }

    /// An array of bulk strings.
    pub fn bulks(values: impl IntoIterator<Item = Bytes>) -> Self {
        Reply::Array(values.into_iter().map(Reply::Bulk).collect())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }
}
