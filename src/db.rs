//! Database handle.
//!
//! [`Database`] wires the pieces together: one keyspace, one blocking
//! coordinator, the executor over both, and the background sweeper.

use std::sync::Arc;
use tracing::{debug, info};

use crate::commands::{Command, CommandExecutor, Reply};
use crate::config::EngineConfig;
use crate::error::{ConfigError, StoreResult};
use crate::storage::{
    BlockingCoordinator, Clock, ExpirySweeper, Keyspace, MonotonicClock, StorageStats,
};

/// A running EmberKV instance.
///
/// Dropping the database stops its sweeper. Executors handed out by
/// [`Database::executor`] keep the keyspace alive on their own.
#[derive(Debug)]
pub struct Database {
    executor: CommandExecutor,
    sweeper: Option<ExpirySweeper>,
}

/// Point-in-time counters for a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub storage: StorageStats,
    /// Keys with at least one parked consumer
    pub blocked_keys: usize,
}

impl Database {
    /// Opens a database with the system clock.
    ///
    /// The sweeper is started when called from within a Tokio runtime and
    /// `config.sweeper` is set. Outside a runtime expired keys are still
    /// invisible; they are reclaimed on access only.
    pub fn open(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::open_with_clock(config, Arc::new(MonotonicClock))
    }

    /// Opens a database with a caller-provided clock.
    pub fn open_with_clock(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let keyspace = Arc::new(Keyspace::with_clock(config.shards, clock));
        let blocking = Arc::new(BlockingCoordinator::new(keyspace.clock_handle()));
        let executor = CommandExecutor::with_coordinator(Arc::clone(&keyspace), blocking);

        let sweeper = if !config.sweeper {
            debug!("Expiry sweeper disabled by configuration");
            None
        } else if tokio::runtime::Handle::try_current().is_ok() {
            Some(ExpirySweeper::start(keyspace, config.expiry.clone()))
        } else {
            debug!("No Tokio runtime, expiry sweeper not started");
            None
        };

        info!(
            version = crate::VERSION,
            shards = config.shards,
            sweeper = sweeper.is_some(),
            "EmberKV database opened"
        );

        Ok(Self { executor, sweeper })
    }

    /// Returns a handle for running commands. Clones are cheap.
    pub fn executor(&self) -> CommandExecutor {
        self.executor.clone()
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        self.executor.keyspace()
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Executes a command and returns its reply.
    pub async fn execute(&self, command: Command) -> StoreResult<Reply> {
        self.executor.execute(command).await
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            storage: self.keyspace().stats(),
            blocked_keys: self.executor.coordinator().blocked_keys(),
        }
    }
}
