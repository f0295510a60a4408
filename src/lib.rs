//! # EmberKV - An Embeddable In-Memory Data Structure Engine
//!
//! EmberKV keeps typed values under byte-string keys: plain scalars, field
//! maps, sequences and unique sets. Keys and individual map fields can carry
//! deadlines, and consumers can block on empty sequences until a producer
//! pushes data.
//!
//! ## Features
//!
//! - **Typed Values**: four structures, with type-checked access
//! - **Concurrent**: sharded storage with `parking_lot::RwLock` per shard
//! - **Atomic Commands**: multi-key commands lock every shard they touch
//! - **TTL Support**: key and field deadlines, lazy plus background expiry
//! - **Blocking Pops**: FIFO-fair waiters built on Tokio primitives
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              EmberKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────────┐    ┌──────────────────────┐     │
//! │  │  Database   │───>│ CommandExecutor │───>│ BlockingCoordinator  │     │
//! │  │  (handle)   │    │  (typed cmds)   │    │  (FIFO waiters)      │     │
//! │  └─────────────┘    └────────┬────────┘    └──────────────────────┘     │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │                     │                 Keyspace                     │    │
//! │                     │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │                     │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │    │
//! │                     │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │    │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │                     └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use emberkv::{Command, Database, EngineConfig, Reply};
//! use emberkv::commands::End;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(EngineConfig::default())?;
//! let executor = db.executor();
//!
//! executor.set_fields(
//!     &Bytes::from("user:1"),
//!     vec![(Bytes::from("name"), Bytes::from("Ariz"))],
//! )?;
//!
//! let reply = db
//!     .execute(Command::Push {
//!         key: Bytes::from("jobs"),
//!         end: End::Right,
//!         values: vec![Bytes::from("build")],
//!     })
//!     .await?;
//! assert_eq!(reply, Reply::Integer(1));
//!
//! let (key, job) = executor
//!     .blocking_pop_left(&[Bytes::from("jobs")], Duration::from_secs(1), None)
//!     .await?;
//! assert_eq!((key, job), (Bytes::from("jobs"), Bytes::from("build")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: Sharded keyspace, value types, clock, blocking coordinator, sweeper
//! - [`commands`]: Typed commands and the executor that runs them
//! - [`config`]: Engine configuration and environment overrides
//! - [`db`]: The database handle tying everything together
//! - [`error`]: Error types
//!
//! ## Design Highlights
//!
//! ### Thread Safety
//!
//! The keyspace uses a sharded design with 64 independent RwLocks by default.
//! Single-key commands take one shard lock. Multi-key commands take every
//! lock they need in ascending shard order, so they are atomic and cannot
//! deadlock against each other.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: An expired key is treated as absent the moment it is due
//! 2. **Active**: A background task periodically reclaims expired keys
//!
//! ### Blocking Without Busy-Waiting
//!
//! A blocked consumer parks on a `tokio::sync::Notify`. Producers wake at
//! most one waiter per pushed element, oldest first.

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandExecutor, Reply};
pub use config::EngineConfig;
pub use db::{Database, DatabaseStats};
pub use error::{ConfigError, StoreError, StoreResult};
pub use storage::{Expiry, Keyspace};

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
