//! Command-level behaviour through the public `Database` API.

mod common;

use anyhow::Result;
use common::{b, bs, lazy_db, manual_db};
use emberkv::commands::{End, SetOptions};
use emberkv::storage::{Expiry, Ttl, ValueType};
use emberkv::{Command, Reply, StoreError};
use std::time::Duration;

#[tokio::test]
async fn field_map_write_is_all_or_nothing() -> Result<()> {
    let db = lazy_db();
    let exec = db.executor();

    exec.set(b("scalar"), b("x"), SetOptions::default())?;
    let err = exec.set_fields(&b("scalar"), vec![(b("f"), b("v"))]);
    assert_eq!(err, Err(StoreError::WrongType));
    assert_eq!(exec.get(b"scalar")?, Some(b("x")));

    let added = exec.set_fields(
        &b("user"),
        vec![(b("name"), b("a")), (b("age"), b("30")), (b("name"), b("b"))],
    )?;
    assert_eq!(added, 2);
    assert_eq!(exec.get_field(b"user", b"name")?, Some(b("b")));
    assert_eq!(exec.field_len(b"user")?, 2);
    Ok(())
}

#[tokio::test]
async fn set_membership_is_idempotent() -> Result<()> {
    let db = lazy_db();
    let exec = db.executor();

    assert_eq!(exec.add(&b("s"), bs(&["a", "b", "a"]))?, 2);
    assert_eq!(exec.add(&b("s"), bs(&["a", "b"]))?, 0);
    assert_eq!(exec.cardinality(b"s")?, 2);

    assert_eq!(exec.remove(&b("s"), &bs(&["a", "missing"]))?, 1);
    assert_eq!(exec.remove(&b("s"), &bs(&["a"]))?, 0);

    // Removing the last member removes the key.
    assert_eq!(exec.remove(&b("s"), &bs(&["b"]))?, 1);
    assert_eq!(exec.key_type(b"s"), None);
    Ok(())
}

#[tokio::test]
async fn sequence_ends_behave_as_queue_and_stack() -> Result<()> {
    let db = lazy_db();
    let exec = db.executor();

    exec.push_right(&b("q"), bs(&["1", "2", "3"]))?;
    assert_eq!(exec.range(b"q", 0, -1)?, bs(&["1", "2", "3"]));
    assert_eq!(exec.pop_left(&b("q"), 1)?, bs(&["1"]));

    exec.push_left(&b("stack"), bs(&["a", "b", "c"]))?;
    assert_eq!(exec.range(b"stack", 0, -1)?, bs(&["c", "b", "a"]));
    assert_eq!(exec.pop_left(&b("stack"), 2)?, bs(&["c", "b"]));

    assert_eq!(exec.pop_left(&b("stack"), 5)?, bs(&["a"]));
    assert!(!db.keyspace().exists(b"stack"));
    Ok(())
}

#[tokio::test]
async fn expired_key_is_absent_without_sweeper() -> Result<()> {
    let (db, clock) = manual_db();
    let exec = db.executor();

    exec.set(
        b("session"),
        b("token"),
        SetOptions::default().with_expiry(Expiry::millis(100)),
    )?;
    exec.push_right(&b("list"), bs(&["x"]))?;
    exec.expire(&b("list"), Expiry::millis(100))?;

    clock.advance(Duration::from_millis(99));
    assert_eq!(exec.get(b"session")?, Some(b("token")));

    clock.advance(Duration::from_millis(1));
    assert_eq!(exec.get(b"session")?, None);
    assert_eq!(exec.ttl(b"session"), Ttl::Absent);
    assert_eq!(exec.seq_len(b"list")?, 0);
    assert_eq!(exec.exists(&bs(&["session", "list"]))?, 0);
    Ok(())
}

#[tokio::test]
async fn field_deadlines_expire_individually() -> Result<()> {
    let (db, clock) = manual_db();
    let exec = db.executor();

    exec.set_fields(&b("h"), vec![(b("keep"), b("1")), (b("drop"), b("2"))])?;
    exec.expire_fields(&b("h"), Expiry::millis(50), &bs(&["drop"]))?;

    clock.advance(Duration::from_millis(50));
    assert_eq!(exec.get_field(b"h", b"drop")?, None);
    assert_eq!(exec.field_names(b"h")?, bs(&["keep"]));
    assert_eq!(exec.field_len(b"h")?, 1);
    Ok(())
}

#[tokio::test]
async fn set_algebra() -> Result<()> {
    let db = lazy_db();
    let exec = db.executor();

    exec.add(&b("a"), bs(&["1", "2", "3"]))?;
    exec.add(&b("b"), bs(&["2", "3", "4"]))?;

    let mut inter = exec.intersect(&bs(&["a", "b"]))?;
    inter.sort();
    assert_eq!(inter, bs(&["2", "3"]));

    let mut union = exec.union(&bs(&["a", "b", "missing"]))?;
    union.sort();
    assert_eq!(union, bs(&["1", "2", "3", "4"]));

    assert_eq!(exec.difference(&bs(&["a", "b"]))?, bs(&["1"]));
    assert!(exec.intersect(&bs(&["a", "missing"]))?.is_empty());

    assert_eq!(exec.union_store(&b("dest"), &bs(&["a", "b"]))?, 4);
    assert_eq!(exec.cardinality(b"dest")?, 4);

    // An empty result deletes the destination.
    assert_eq!(exec.intersect_store(&b("dest"), &bs(&["a", "missing"]))?, 0);
    assert_eq!(exec.key_type(b"dest"), None);
    Ok(())
}

#[tokio::test]
async fn wrong_type_never_mutates() -> Result<()> {
    let db = lazy_db();
    let exec = db.executor();

    exec.push_right(&b("list"), bs(&["x"]))?;

    assert_eq!(exec.get(b"list"), Err(StoreError::WrongType));
    assert_eq!(exec.incr(&b("list")), Err(StoreError::WrongType));
    assert_eq!(exec.add(&b("list"), bs(&["m"])), Err(StoreError::WrongType));
    assert_eq!(exec.get_field(b"list", b"f"), Err(StoreError::WrongType));
    assert_eq!(
        exec.union(&bs(&["list", "other"])),
        Err(StoreError::WrongType)
    );

    assert_eq!(exec.key_type(b"list"), Some(ValueType::Sequence));
    assert_eq!(exec.range(b"list", 0, -1)?, bs(&["x"]));
    Ok(())
}

#[tokio::test]
async fn integer_overflow_leaves_value_unchanged() -> Result<()> {
    let db = lazy_db();
    let exec = db.executor();

    exec.set(b("n"), b(&i64::MAX.to_string()), SetOptions::default())?;
    assert!(matches!(exec.incr(&b("n")), Err(StoreError::OutOfRange(_))));
    assert_eq!(exec.get(b"n")?, Some(b(&i64::MAX.to_string())));

    exec.set(b("text"), b("abc"), SetOptions::default())?;
    assert_eq!(exec.incr(&b("text")), Err(StoreError::NotANumber));
    assert_eq!(exec.get(b"text")?, Some(b("abc")));
    Ok(())
}

#[tokio::test]
async fn execute_replies() -> Result<()> {
    let db = lazy_db();

    let reply = db
        .execute(Command::Push {
            key: b("q"),
            end: End::Right,
            values: bs(&["a", "b"]),
        })
        .await?;
    assert_eq!(reply, Reply::Integer(2));

    let reply = db.execute(Command::Type { key: b("q") }).await?;
    assert_eq!(reply, Reply::Bulk(b("list")));

    let reply = db.execute(Command::Type { key: b("nope") }).await?;
    assert_eq!(reply, Reply::Bulk(b("none")));

    let reply = db.execute(Command::Ttl { key: b("nope") }).await?;
    assert_eq!(reply, Reply::Integer(-2));

    let reply = db.execute(Command::Ttl { key: b("q") }).await?;
    assert_eq!(reply, Reply::Integer(-1));

    let reply = db
        .execute(Command::BlockingPop {
            keys: bs(&["empty"]),
            end: End::Left,
            timeout: Duration::from_millis(20),
            cancel: None,
        })
        .await?;
    assert!(reply.is_nil());

    let err = db.execute(Command::Delete { keys: vec![] }).await;
    assert!(matches!(err, Err(StoreError::WrongArity(_))));
    Ok(())
}
