//! Expiry Clock
//!
//! Every expiry decision in the engine reads time from a single [`Clock`].
//! Using one monotonic source means "is this key expired?" is answered the
//! same way by lookups, writes, the sweeper and blocking timeouts, and none
//! of them are affected by wall-clock adjustments.
//!
//! TTLs arrive at the API boundary either as a relative duration or as an
//! absolute point in time ([`Expiry`]). They are normalised to an absolute
//! monotonic [`Instant`] before they are stored.

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use crate::error::{StoreError, StoreResult};

/// A monotonic time source.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The production clock, backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Useful for exercising expiry boundaries deterministically.
///
/// ```
/// use emberkv::storage::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let t0 = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now() - t0, Duration::from_secs(5));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// An expiration time as supplied by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Expire after the given duration, measured from now.
    In(Duration),
    /// Expire at a monotonic instant.
    At(Instant),
    /// Expire at a wall-clock time (e.g. a unix timestamp).
    AtSystem(SystemTime),
}

impl Expiry {
    /// Convenience for `Expiry::In(Duration::from_secs(secs))`.
    pub fn secs(secs: u64) -> Self {
        Expiry::In(Duration::from_secs(secs))
    }

    /// Convenience for `Expiry::In(Duration::from_millis(ms))`.
    pub fn millis(ms: u64) -> Self {
        Expiry::In(Duration::from_millis(ms))
    }

    /// Resolves this expiry to an absolute instant on the given clock.
    ///
    /// Wall-clock times are translated by their distance from
    /// `SystemTime::now()`; a time already in the past resolves to an
    /// instant at or before `now`, which makes the entry immediately absent.
    /// A deadline too far ahead to be represented is `OutOfRange`.
    pub fn deadline(&self, clock: &dyn Clock) -> StoreResult<Instant> {
        let now = clock.now();
        let at = match *self {
            Expiry::In(ttl) => now.checked_add(ttl),
            Expiry::At(at) => Some(at),
            Expiry::AtSystem(at) => match at.duration_since(SystemTime::now()) {
                Ok(ahead) => now.checked_add(ahead),
                Err(behind) => Some(now.checked_sub(behind.duration()).unwrap_or(now)),
            },
        };
        at.ok_or(StoreError::OutOfRange("invalid expire time"))
    }
}

/// Returns `true` if `deadline` is at or before `now`.
#[inline]
pub(crate) fn is_past(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.map(|at| at <= now).unwrap_or(false)
}
