//! Storage Module
//!
//! This module provides the data layer of EmberKV: the sharded keyspace with
//! its four value types, the clock every expiry decision is made against, the
//! coordinator that parks blocked consumers, and the background sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └───────────────▲─────────────────────────────▲───────────────┘
//!                 │                             │
//!    ┌────────────┴────────────┐   ┌────────────┴──────────────┐
//!    │          Clock          │   │      ExpirySweeper        │
//!    │ (lazy expiry decisions) │   │  (Background Tokio Task)  │
//!    └─────────────────────────┘   └───────────────────────────┘
//!
//!                ┌──────────────────────────────┐
//!                │     BlockingCoordinator      │
//!                │  (per-key FIFO waiter queues)│
//!                └──────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Typed Values**: scalars, field maps, sequences and unique sets
//! - **Sharded Storage**: independent `parking_lot::RwLock` shards
//! - **TTL Support**: per-key deadlines, and per-field deadlines in field maps
//! - **Lazy Expiry**: expired data is invisible the instant it is due
//! - **Active Expiry**: the sweeper reclaims keys nobody reads again
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::{Expiry, Keyspace, Ttl, Value, ValueType};
//! use bytes::Bytes;
//!
//! let keyspace = Keyspace::new();
//!
//! keyspace.insert(Bytes::from("name"), Value::Scalar(Bytes::from("Ariz")));
//! assert_eq!(keyspace.key_type(b"name"), Some(ValueType::Scalar));
//!
//! keyspace.insert_with_expiry(
//!     Bytes::from("session"),
//!     Value::Scalar(Bytes::from("token123")),
//!     Expiry::secs(3600),
//! )
//! .unwrap();
//! assert!(matches!(keyspace.ttl(b"session"), Ttl::Remaining(_)));
//! ```

pub mod blocking;
pub mod clock;
pub mod engine;
pub mod expiry;
pub mod glob;
pub mod value;

// Re-export commonly used types
pub use blocking::{BlockingCoordinator, CancelToken, Registration, WaitOutcome, Wake};
pub use clock::{Clock, Expiry, ManualClock, MonotonicClock};
pub use engine::{Entry, Keyspace, Slots, StorageStats, Ttl, DEFAULT_SHARDS};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use glob::glob_match;
pub use value::{Field, FieldMap, Value, ValueType};
