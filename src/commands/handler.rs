//! Command Executor
//!
//! The executor exposes one method per (structure, verb) pair and enforces
//! the rules every command shares:
//!
//! - **Type guards**: a command for one structure type fails with
//!   `WrongType` on a key holding another, and leaves that key untouched.
//! - **Validate, then mutate**: arity, numeric parsing and overflow are
//!   checked before a slot is modified, so a failed command is a no-op.
//! - **Wake consumers**: every write that adds sequence elements notifies the
//!   blocking coordinator after the key lock is released.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandExecutor                         │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  validate   │───>│  keyspace   │     │
//! │  │  (Command)  │    │  arguments  │    │  closure    │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                     BlockingCoordinator     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The per-structure methods live in sibling modules (`scalar`, `field_map`,
//! `sequence`, `unique_set`, `keys`, `blocking`); this module holds the
//! struct, the shared type guards and the [`Command`] dispatch.

use bytes::Bytes;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use super::command::{Command, Reply};
use crate::error::{StoreError, StoreResult};
use crate::storage::{BlockingCoordinator, Entry, FieldMap, Keyspace, Ttl, Value};

/// Executes typed commands against a [`Keyspace`].
///
/// Cheap to clone; clones share the keyspace and the coordinator.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    pub(super) keyspace: Arc<Keyspace>,
    pub(super) blocking: Arc<BlockingCoordinator>,
}

impl CommandExecutor {
    /// Creates an executor over `keyspace` with its own blocking coordinator.
    pub fn new(keyspace: Arc<Keyspace>) -> Self {
        let blocking = Arc::new(BlockingCoordinator::new(keyspace.clock_handle()));
        Self::with_coordinator(keyspace, blocking)
    }

    /// Creates an executor sharing an existing coordinator.
    pub fn with_coordinator(keyspace: Arc<Keyspace>, blocking: Arc<BlockingCoordinator>) -> Self {
        Self { keyspace, blocking }
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    pub fn coordinator(&self) -> &Arc<BlockingCoordinator> {
        &self.blocking
    }

    /// Executes a command and returns its reply.
    ///
    /// A blocking command that times out replies `Nil`.
    pub async fn execute(&self, command: Command) -> StoreResult<Reply> {
        let reply = match command {
            // Scalar commands
            Command::Get { key } => Reply::optional(self.get(&key)?),
            Command::Set {
                key,
                value,
                options,
            } => {
                let outcome = self.set(key, value, options)?;
                if options.get {
                    Reply::optional(outcome.previous)
                } else if outcome.written {
                    Reply::Ok
                } else {
                    Reply::Nil
                }
            }
            Command::GetDel { key } => Reply::optional(self.get_del(&key)?),
            Command::MultiGet { keys } => Reply::Array(
                self.mget(&keys)?
                    .into_iter()
                    .map(Reply::optional)
                    .collect(),
            ),
            Command::MultiSet { pairs } => {
                self.mset(pairs)?;
                Reply::Ok
            }
            Command::IncrBy { key, delta } => Reply::Integer(self.incr_by(&key, delta)?),
            Command::IncrByFloat { key, delta } => {
                Reply::Float(self.incr_by_float(&key, delta)?)
            }
            Command::Append { key, value } => Reply::integer(self.append(&key, &value)?),
            Command::StrLen { key } => Reply::integer(self.strlen(&key)?),
            Command::GetRange { key, start, end } => {
                Reply::Bulk(self.get_range(&key, start, end)?)
            }
            Command::SetRange { key, offset, value } => {
                Reply::integer(self.set_range(&key, offset, &value)?)
            }

            // Field map commands
            Command::SetFields { key, fields } => {
                Reply::integer(self.set_fields(&key, fields)?)
            }
            Command::SetFieldIfAbsent { key, field, value } => {
                Reply::Bool(self.set_field_if_absent(&key, field, value)?)
            }
            Command::GetFields { key, fields } => Reply::Array(
                self.get_fields(&key, &fields)?
                    .into_iter()
                    .map(Reply::optional)
                    .collect(),
            ),
            Command::GetAllFields { key } => Reply::Array(
                self.get_all_fields(&key)?
                    .into_iter()
                    .flat_map(|(f, v)| [Reply::Bulk(f), Reply::Bulk(v)])
                    .collect(),
            ),
            Command::FieldNames { key } => Reply::bulks(self.field_names(&key)?),
            Command::FieldValues { key } => Reply::bulks(self.field_values(&key)?),
            Command::FieldLen { key } => Reply::integer(self.field_len(&key)?),
            Command::FieldExists { key, field } => {
                Reply::Bool(self.field_exists(&key, &field)?)
            }
            Command::DeleteFields { key, fields } => {
                Reply::integer(self.delete_fields(&key, &fields)?)
            }
            Command::IncrFieldBy { key, field, delta } => {
                Reply::Integer(self.incr_field_by(&key, field, delta)?)
            }
            Command::IncrFieldByFloat { key, field, delta } => {
                Reply::Float(self.incr_field_by_float(&key, field, delta)?)
            }
            Command::ExpireFields {
                key,
                expiry,
                fields,
            } => Reply::Array(
                self.expire_fields(&key, expiry, &fields)?
                    .into_iter()
                    .map(|status| Reply::Integer(status.code()))
                    .collect(),
            ),
            Command::FieldTtl { key, fields } => Reply::Array(
                self.field_ttl(&key, &fields)?
                    .into_iter()
                    .map(ttl_reply)
                    .collect(),
            ),
            Command::PersistFields { key, fields } => Reply::Array(
                self.persist_fields(&key, &fields)?
                    .into_iter()
                    .map(|status| Reply::Integer(status.code()))
                    .collect(),
            ),

            // Sequence commands
            Command::Push { key, end, values } => Reply::integer(self.push(&key, end, values)?),
            Command::PushExisting { key, end, values } => {
                Reply::integer(self.push_existing(&key, end, values)?)
            }
            Command::Pop { key, end, count } => Reply::bulks(self.pop(&key, end, count)?),
            Command::Range { key, start, end } => Reply::bulks(self.range(&key, start, end)?),
            Command::Index { key, index } => Reply::optional(self.index(&key, index)?),
            Command::SetIndex { key, index, value } => {
                self.set_index(&key, index, value)?;
                Reply::Ok
            }
            Command::SeqLen { key } => Reply::integer(self.seq_len(&key)?),
            Command::RemoveValue { key, count, value } => {
                Reply::integer(self.remove_value(&key, count, &value)?)
            }
            Command::Trim { key, start, end } => {
                self.trim(&key, start, end)?;
                Reply::Ok
            }
            Command::Move {
                source,
                destination,
                from,
                to,
            } => Reply::optional(self.move_element(&source, &destination, from, to)?),
            Command::BlockingPop {
                keys,
                end,
                timeout,
                cancel,
            } => match self.blocking_pop(&keys, end, timeout, cancel.as_ref()).await {
                Ok((key, value)) => Reply::bulks([key, value]),
                Err(StoreError::Timeout) => Reply::Nil,
                Err(e) => return Err(e),
            },
            Command::BlockingMove {
                source,
                destination,
                from,
                to,
                timeout,
                cancel,
            } => match self
                .blocking_move(&source, &destination, from, to, timeout, cancel.as_ref())
                .await
            {
                Ok(value) => Reply::Bulk(value),
                Err(StoreError::Timeout) => Reply::Nil,
                Err(e) => return Err(e),
            },

            // Unique set commands
            Command::Add { key, members } => Reply::integer(self.add(&key, members)?),
            Command::Remove { key, members } => Reply::integer(self.remove(&key, &members)?),
            Command::IsMember { key, member } => Reply::Bool(self.is_member(&key, &member)?),
            Command::Members { key } => Reply::bulks(self.members(&key)?),
            Command::Cardinality { key } => Reply::integer(self.cardinality(&key)?),
            Command::Intersect { keys } => Reply::bulks(self.intersect(&keys)?),
            Command::Union { keys } => Reply::bulks(self.union(&keys)?),
            Command::Difference { keys } => Reply::bulks(self.difference(&keys)?),
            Command::IntersectStore { destination, keys } => {
                Reply::integer(self.intersect_store(&destination, &keys)?)
            }
            Command::UnionStore { destination, keys } => {
                Reply::integer(self.union_store(&destination, &keys)?)
            }
            Command::DifferenceStore { destination, keys } => {
                Reply::integer(self.difference_store(&destination, &keys)?)
            }
            Command::RandomMembers { key, count } => {
                Reply::bulks(self.random_members(&key, count)?)
            }
            Command::PopMembers { key, count } => Reply::bulks(self.pop_members(&key, count)?),
            Command::MoveMember {
                source,
                destination,
                member,
            } => Reply::Bool(self.move_member(&source, &destination, &member)?),

            // Key commands
            Command::Delete { keys } => Reply::integer(self.delete(&keys)?),
            Command::Exists { keys } => Reply::integer(self.exists(&keys)?),
            Command::Expire { key, expiry } => Reply::Bool(self.expire(&key, expiry)?),
            Command::Persist { key } => Reply::Bool(self.persist(&key)),
            Command::Ttl { key } => ttl_reply(self.ttl(&key)),
            Command::Type { key } => {
                Reply::bulk(self.key_type(&key).map_or("none", |t| t.as_str()))
            }
            Command::Rename { key, new_key } => {
                self.rename(&key, &new_key)?;
                Reply::Ok
            }
            Command::RenameIfAbsent { key, new_key } => {
                Reply::Bool(self.rename_if_absent(&key, &new_key)?)
            }
            Command::Keys { pattern } => Reply::bulks(self.keys(&pattern)),
            Command::Scan {
                cursor,
                count,
                pattern,
            } => {
                let (next, keys) = self.scan(cursor, count, pattern.as_deref());
                Reply::Array(vec![
                    Reply::bulk(next.to_string()),
                    Reply::bulks(keys),
                ])
            }
            Command::DbSize => Reply::integer(self.dbsize()),
            Command::Flush => {
                self.flush();
                Reply::Ok
            }
        };

        Ok(reply)
    }
}

/// TTL in milliseconds, `-1` without expiry, `-2` when absent.
fn ttl_reply(ttl: Ttl) -> Reply {
    match ttl {
        Ttl::Absent => Reply::Integer(-2),
        Ttl::NoExpiry => Reply::Integer(-1),
        Ttl::Remaining(left) => Reply::integer(left.as_millis()),
    }
}

// ============================================================================
// Type guards
// ============================================================================

pub(super) fn as_scalar(value: Option<&Value>) -> StoreResult<Option<&Bytes>> {
    match value {
        None => Ok(None),
        Some(Value::Scalar(bytes)) => Ok(Some(bytes)),
        Some(_) => Err(StoreError::WrongType),
    }
}

pub(super) fn as_field_map(value: Option<&Value>) -> StoreResult<Option<&FieldMap>> {
    match value {
        None => Ok(None),
        Some(Value::FieldMap(map)) => Ok(Some(map)),
        Some(_) => Err(StoreError::WrongType),
    }
}

pub(super) fn as_sequence(value: Option<&Value>) -> StoreResult<Option<&VecDeque<Bytes>>> {
    match value {
        None => Ok(None),
        Some(Value::Sequence(list)) => Ok(Some(list)),
        Some(_) => Err(StoreError::WrongType),
    }
}

pub(super) fn as_set(value: Option<&Value>) -> StoreResult<Option<&HashSet<Bytes>>> {
    match value {
        None => Ok(None),
        Some(Value::UniqueSet(set)) => Ok(Some(set)),
        Some(_) => Err(StoreError::WrongType),
    }
}

pub(super) fn scalar_mut(slot: &mut Option<Entry>) -> StoreResult<Option<&mut Entry>> {
    match slot {
        None => Ok(None),
        Some(entry) if matches!(entry.value, Value::Scalar(_)) => Ok(Some(entry)),
        Some(_) => Err(StoreError::WrongType),
    }
}

pub(super) fn field_map_mut(slot: &mut Option<Entry>) -> StoreResult<Option<&mut FieldMap>> {
    match slot {
        None => Ok(None),
        Some(Entry {
            value: Value::FieldMap(map),
            ..
        }) => Ok(Some(map)),
        Some(_) => Err(StoreError::WrongType),
    }
}

pub(super) fn sequence_mut(slot: &mut Option<Entry>) -> StoreResult<Option<&mut VecDeque<Bytes>>> {
    match slot {
        None => Ok(None),
        Some(Entry {
            value: Value::Sequence(list),
            ..
        }) => Ok(Some(list)),
        Some(_) => Err(StoreError::WrongType),
    }
}

pub(super) fn set_mut(slot: &mut Option<Entry>) -> StoreResult<Option<&mut HashSet<Bytes>>> {
    match slot {
        None => Ok(None),
        Some(Entry {
            value: Value::UniqueSet(set),
            ..
        }) => Ok(Some(set)),
        Some(_) => Err(StoreError::WrongType),
    }
}

/// Returns the field map in `slot`, creating an empty one if absent.
pub(super) fn field_map_or_create(slot: &mut Option<Entry>) -> StoreResult<&mut FieldMap> {
    let entry = slot.get_or_insert_with(|| Entry::new(Value::FieldMap(FieldMap::new())));
    match &mut entry.value {
        Value::FieldMap(map) => Ok(map),
        _ => Err(StoreError::WrongType),
    }
}

/// Returns the sequence in `slot`, creating an empty one if absent.
pub(super) fn sequence_or_create(slot: &mut Option<Entry>) -> StoreResult<&mut VecDeque<Bytes>> {
    let entry = slot.get_or_insert_with(|| Entry::new(Value::Sequence(VecDeque::new())));
    match &mut entry.value {
        Value::Sequence(list) => Ok(list),
        _ => Err(StoreError::WrongType),
    }
}

/// Returns the set in `slot`, creating an empty one if absent.
pub(super) fn set_or_create(slot: &mut Option<Entry>) -> StoreResult<&mut HashSet<Bytes>> {
    let entry = slot.get_or_insert_with(|| Entry::new(Value::UniqueSet(HashSet::new())));
    match &mut entry.value {
        Value::UniqueSet(set) => Ok(set),
        _ => Err(StoreError::WrongType),
    }
}

/// Rejects an empty argument list for a variadic command.
pub(super) fn require_args<T>(args: &[T], command: &'static str) -> StoreResult<()> {
    if args.is_empty() {
        Err(StoreError::WrongArity(command))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::command::{End, SetOptions};
    use crate::storage::Expiry;
    use std::time::Duration;

    fn create_executor() -> CommandExecutor {
        CommandExecutor::new(Arc::new(Keyspace::new()))
    }

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[tokio::test]
    async fn test_set_get() {
        let exec = create_executor();

        let reply = exec
            .execute(Command::Set {
                key: b("key"),
                value: b("value"),
                options: SetOptions::default(),
            })
            .await;
        assert_eq!(reply, Ok(Reply::Ok));

        let reply = exec.execute(Command::Get { key: b("key") }).await;
        assert_eq!(reply, Ok(Reply::bulk("value")));

        let reply = exec.execute(Command::Get { key: b("missing") }).await;
        assert_eq!(reply, Ok(Reply::Nil));
    }

    #[tokio::test]
    async fn test_set_if_absent_reply() {
        let exec = create_executor();
        let set_nx = |v: &str| Command::Set {
            key: b("key"),
            value: b(v),
            options: SetOptions::if_absent(),
        };

        assert_eq!(exec.execute(set_nx("a")).await, Ok(Reply::Ok));
        assert_eq!(exec.execute(set_nx("b")).await, Ok(Reply::Nil));
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let exec = create_executor();
        exec.execute(Command::Set {
            key: b("s"),
            value: b("v"),
            options: SetOptions::default(),
        })
        .await
        .unwrap();

        let reply = exec
            .execute(Command::Push {
                key: b("s"),
                end: End::Left,
                values: vec![b("x")],
            })
            .await;
        assert_eq!(reply, Err(StoreError::WrongType));
        assert_eq!(
            exec.execute(Command::Get { key: b("s") }).await,
            Ok(Reply::bulk("v"))
        );
    }

    #[tokio::test]
    async fn test_variadic_arity_is_checked() {
        let exec = create_executor();
        let reply = exec
            .execute(Command::Add {
                key: b("set"),
                members: vec![],
            })
            .await;
        assert!(matches!(reply, Err(StoreError::WrongArity(_))));
        assert!(!exec.keyspace().exists(b"set"));
    }

    #[tokio::test]
    async fn test_ttl_replies() {
        let exec = create_executor();
        assert_eq!(
            exec.execute(Command::Ttl { key: b("k") }).await,
            Ok(Reply::Integer(-2))
        );

        exec.execute(Command::Set {
            key: b("k"),
            value: b("v"),
            options: SetOptions::default(),
        })
        .await
        .unwrap();
        assert_eq!(
            exec.execute(Command::Ttl { key: b("k") }).await,
            Ok(Reply::Integer(-1))
        );

        exec.execute(Command::Expire {
            key: b("k"),
            expiry: Expiry::secs(10),
        })
        .await
        .unwrap();
        match exec.execute(Command::Ttl { key: b("k") }).await {
            Ok(Reply::Integer(ms)) => assert!(ms > 9_000 && ms <= 10_000),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocking_pop_timeout_replies_nil() {
        let exec = create_executor();
        let reply = exec
            .execute(Command::BlockingPop {
                keys: vec![b("empty")],
                end: End::Left,
                timeout: Duration::from_millis(20),
                cancel: None,
            })
            .await;
        assert_eq!(reply, Ok(Reply::Nil));
    }

    #[tokio::test]
    async fn test_type_command() {
        let exec = create_executor();
        exec.execute(Command::Push {
            key: b("list"),
            end: End::Right,
            values: vec![b("a")],
        })
        .await
        .unwrap();

        assert_eq!(
            exec.execute(Command::Type { key: b("list") }).await,
            Ok(Reply::bulk("list"))
        );
        assert_eq!(
            exec.execute(Command::Type { key: b("nothing") }).await,
            Ok(Reply::bulk("none"))
        );
    }

    #[tokio::test]
    async fn test_get_all_fields_is_flat() {
        let exec = create_executor();
        exec.execute(Command::SetFields {
            key: b("h"),
            fields: vec![(b("f"), b("v"))],
        })
        .await
        .unwrap();

        assert_eq!(
            exec.execute(Command::GetAllFields { key: b("h") }).await,
            Ok(Reply::Array(vec![Reply::bulk("f"), Reply::bulk("v")]))
        );
    }
}
