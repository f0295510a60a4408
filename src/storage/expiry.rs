//! Background Expiry Sweeper
//!
//! Lazy expiry already makes an expired key invisible the moment its
//! deadline passes. What it cannot do is free the memory of a key nobody
//! touches again. The sweeper reclaims those keys in the background.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and, on every tick:
//! 1. Visits the shards one at a time
//! 2. Evicts at most `batch_size` due keys per shard, oldest deadline first,
//!    and drops expired fields from field maps
//! 3. Yields to the runtime between shards, so a shard lock is never held
//!    for more than one bounded batch
//!
//! ## Adaptive Frequency
//!
//! The interval halves while a large share of the keys with a deadline turn
//! out to be due, and doubles while nothing is found, between
//! `min_interval` and `max_interval`.
//!
//! Stopping the sweeper (or never starting it) only delays reclamation;
//! reads never depend on it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use super::engine::Keyspace;

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 10ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 1s)
    pub max_interval: Duration,

    /// Maximum keys evicted from one shard per pass (default: 64)
    pub batch_size: usize,

    /// If this fraction of keys with a deadline were due, speed up sweeping
    pub speedup_threshold: f64,

    /// If this fraction of keys with a deadline were due, slow down sweeping
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            batch_size: 64,
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime. The sweeper stops when
    /// the returned handle is dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use emberkv::storage::{ExpiryConfig, ExpirySweeper, Keyspace};
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let keyspace = Arc::new(Keyspace::new());
    /// let sweeper = ExpirySweeper::start(keyspace, ExpiryConfig::default());
    ///
    /// // Sweeper runs in the background...
    ///
    /// drop(sweeper);
    /// # }
    /// ```
    pub fn start(keyspace: Arc<Keyspace>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_ms = config.base_interval.as_millis() as u64,
            batch_size = config.batch_size,
            "Background expiry sweeper started"
        );
        tokio::spawn(sweeper_loop(keyspace, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs one pass over every shard.
///
/// Returns the number of keys evicted, or `None` if shutdown was requested
/// part way through.
async fn sweep_once(
    keyspace: &Keyspace,
    batch_size: usize,
    shutdown_rx: &watch::Receiver<bool>,
) -> Option<u64> {
    let mut evicted = 0;
    for shard in 0..keyspace.shard_count() {
        if *shutdown_rx.borrow() {
            return None;
        }
        evicted += keyspace.evict_expired_in_shard(shard, batch_size);
        tokio::task::yield_now().await;
    }
    Some(evicted)
}

/// The main sweeper loop.
async fn sweeper_loop(
    keyspace: Arc<Keyspace>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;
    let batch_size = config.batch_size.max(1);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let volatile_before = keyspace.volatile_len();
        let Some(expired) = sweep_once(&keyspace, batch_size, &shutdown_rx).await else {
            debug!("Expiry sweeper received shutdown signal");
            return;
        };

        if volatile_before > 0 {
            let expiry_rate = expired as f64 / volatile_before as f64;

            if expiry_rate > config.speedup_threshold {
                current_interval = (current_interval / 2).max(config.min_interval);
                debug!(
                    expired,
                    rate = %format!("{:.2}%", expiry_rate * 100.0),
                    new_interval_ms = current_interval.as_millis() as u64,
                    "High expiry rate, speeding up sweeper"
                );
            } else if expiry_rate < config.slowdown_threshold && expired == 0 {
                current_interval = (current_interval * 2).min(config.max_interval);
                trace!(
                    new_interval_ms = current_interval.as_millis() as u64,
                    "Low expiry rate, slowing down sweeper"
                );
            }
        } else if current_interval < config.max_interval {
            current_interval = (current_interval * 2).min(config.max_interval);
        }

        if expired > 0 {
            debug!(
                expired,
                keys_remaining = keyspace.len(),
                "Expired keys cleaned up"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(keyspace: Arc<Keyspace>) -> ExpirySweeper {
    ExpirySweeper::start(keyspace, ExpiryConfig::default())
}
