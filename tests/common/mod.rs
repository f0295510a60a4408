//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use bytes::Bytes;
use emberkv::storage::{Clock, ManualClock};
use emberkv::{CommandExecutor, Database, EngineConfig};

static TRACING: Once = Once::new();

/// Installs a tracing subscriber once per test binary.
///
/// Honors `RUST_LOG`, e.g. `RUST_LOG=emberkv=trace cargo test`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn b(s: &str) -> Bytes {
    Bytes::from(s.to_string())
}

pub fn bs(items: &[&str]) -> Vec<Bytes> {
    items.iter().map(|s| b(s)).collect()
}

/// A database with the sweeper off, so tests observe lazy expiry only.
pub fn lazy_db() -> Database {
    init_tracing();
    let config = EngineConfig {
        shards: 8,
        sweeper: false,
        ..Default::default()
    };
    Database::open(config).expect("valid config")
}

/// A database driven by a manual clock.
pub fn manual_db() -> (Database, Arc<ManualClock>) {
    init_tracing();
    let clock = Arc::new(ManualClock::new());
    let config = EngineConfig {
        shards: 8,
        sweeper: false,
        ..Default::default()
    };
    let db = Database::open_with_clock(config, Arc::clone(&clock) as Arc<dyn Clock>)
        .expect("valid config");
    (db, clock)
}

/// Waits until `n` consumers are parked on `key`.
pub async fn wait_for_waiters(exec: &CommandExecutor, key: &[u8], n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while exec.coordinator().waiting_on(key) < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("waiters did not register");
}
