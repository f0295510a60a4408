//! Command Executor Module
//!
//! This module implements the command layer of EmberKV. It receives typed
//! commands, validates their arguments, executes them against the keyspace,
//! and returns typed replies.
//!
//! ## Architecture
//!
//! ```text
//! Caller / transport
//!       │
//!       ▼
//! ┌─────────────────┐
//! │    Command      │  (typed, arity-checked)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐        ┌──────────────────────┐
//! │ CommandExecutor │───────>│ BlockingCoordinator  │
//! │                 │ notify │  (parked consumers)  │
//! │  - Type guards  │        └──────────────────────┘
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Keyspace     │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Scalar Commands
//! - `GET`, `SET` (NX/XX, EX/PX, KEEPTTL, GET), `GETDEL`, `MGET`, `MSET`
//! - `INCR`, `INCRBY`, `DECR`, `DECRBY`, `INCRBYFLOAT`
//! - `APPEND`, `STRLEN`, `GETRANGE`, `SETRANGE`
//!
//! ### Field Map Commands
//! - `HSET`, `HSETNX`, `HGET`, `HMGET`, `HGETALL`, `HKEYS`, `HVALS`
//! - `HLEN`, `HEXISTS`, `HDEL`, `HINCRBY`, `HINCRBYFLOAT`
//! - `HPEXPIRE`, `HPTTL`, `HPERSIST`
//!
//! ### Sequence Commands
//! - `LPUSH`, `RPUSH`, `LPUSHX`, `RPUSHX`, `LPOP`, `RPOP`
//! - `LRANGE`, `LINDEX`, `LSET`, `LLEN`, `LREM`, `LTRIM`, `LMOVE`
//! - `BLPOP`, `BRPOP`, `BLMOVE`
//!
//! ### Unique Set Commands
//! - `SADD`, `SREM`, `SISMEMBER`, `SMEMBERS`, `SCARD`
//! - `SINTER`, `SUNION`, `SDIFF` and their `STORE` variants
//! - `SRANDMEMBER`, `SPOP`, `SMOVE`
//!
//! ### Key Commands
//! - `DEL`, `EXISTS`, `EXPIRE`, `PERSIST`, `PTTL`, `TYPE`
//! - `RENAME`, `RENAMENX`, `KEYS`, `SCAN`, `DBSIZE`, `FLUSHDB`

mod blocking;
pub mod command;
mod field_map;
pub mod handler;
mod keys;
mod scalar;
mod sequence;
mod unique_set;

// Re-export the executor and the command boundary
pub use command::{
    Command, End, FieldExpireStatus, FieldPersistStatus, Reply, SetCondition, SetOptions,
    SetOutcome,
};
pub use handler::CommandExecutor;
pub use scalar::MAX_SCALAR_LEN;
pub use unique_set::MAX_RANDOM_MEMBERS;
