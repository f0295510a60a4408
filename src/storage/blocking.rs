//! Blocking Coordinator
//!
//! Parks callers that want to pop from an empty sequence and wakes them when
//! data arrives. A waiter moves through a small state machine:
//!
//! ```text
//!            register()
//!                │
//!                ▼
//!          ┌──────────┐   notify(key, n)   ┌────────────┐
//!          │ Waiting  │───────────────────>│ Signalled  │
//!          └────┬─────┘<───────────────────└─────┬──────┘
//!               │         rearm() (lost race)    │
//!    deadline / │                                │ complete()
//!    cancel     ▼                                ▼
//!   ┌───────────────────────┐              ┌───────────┐
//!   │ TimedOut | Cancelled  │              │ Satisfied │
//!   └───────────────────────┘              └───────────┘
//! ```
//!
//! Waiters hold no keyspace lock while parked. A wake-up is only a hint: the
//! woken caller re-checks the keyspace and, if another consumer got there
//! first, goes back to waiting at the head of the queue.
//!
//! Waiters on one key are served first-registered-first-served. A caller
//! waiting on several keys is queued on all of them; the first signal removes
//! it from every queue. A waiter that is dropped after being signalled hands
//! its signal to the next waiter on that key, so no element is left stranded
//! while someone is still waiting for it.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Notify};
use tracing::{debug, trace};

use super::clock::Clock;

/// Final state of a waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Data became available and the waiter consumed it.
    Satisfied,
    /// The deadline elapsed first.
    TimedOut,
    /// The caller withdrew.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WaiterState {
    Waiting,
    /// Woken because data arrived on this key.
    Signalled(Bytes),
    Done(WaitOutcome),
}

/// Why [`Registration::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Data may be available; re-check the keyspace.
    Signalled,
    TimedOut,
    Cancelled,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    keys: Vec<Bytes>,
    notify: Notify,
    state: Mutex<WaiterState>,
}

/// A handle a caller can use to withdraw a blocking operation.
///
/// Clones share the same signal. Built on a `watch` channel, the same way the
/// sweeper receives its shutdown signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancels every operation waiting on this token.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks callers waiting for data on sequence keys.
#[derive(Debug)]
pub struct BlockingCoordinator {
    queues: Mutex<HashMap<Bytes, VecDeque<Arc<Waiter>>>>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl BlockingCoordinator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Registers a waiter on every key in `keys`.
    ///
    /// The waiter stays registered until the returned handle completes or is
    /// dropped.
    pub fn register(self: &Arc<Self>, keys: &[Bytes]) -> Registration {
        let mut unique: Vec<Bytes> = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(key) {
                unique.push(key.clone());
            }
        }

        let waiter = Arc::new(Waiter {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            keys: unique,
            notify: Notify::new(),
            state: Mutex::new(WaiterState::Waiting),
        });

        {
            let mut queues = self.queues.lock();
            for key in &waiter.keys {
                queues
                    .entry(key.clone())
                    .or_default()
                    .push_back(Arc::clone(&waiter));
            }
        }
        trace!(waiter = waiter.id, keys = waiter.keys.len(), "Waiter registered");

        Registration {
            coordinator: Arc::clone(self),
            waiter,
        }
    }

    /// Wakes up to `available` waiters on `key`, oldest first.
    ///
    /// Returns how many waiters were signalled.
    pub fn notify(&self, key: &[u8], available: usize) -> usize {
        if available == 0 {
            return 0;
        }

        let mut woken = Vec::new();
        {
            let mut queues = self.queues.lock();
            while woken.len() < available {
                let Some(waiter) = queues.get_mut(key).and_then(VecDeque::pop_front) else {
                    break;
                };
                let mut state = waiter.state.lock();
                if *state != WaiterState::Waiting {
                    continue;
                }
                *state = WaiterState::Signalled(Bytes::copy_from_slice(key));
                drop(state);

                for other in waiter.keys.iter().filter(|k| k.as_ref() != key) {
                    Self::unqueue(&mut queues, other, waiter.id);
                }
                woken.push(waiter);
            }
            if queues.get(key).is_some_and(VecDeque::is_empty) {
                queues.remove(key);
            }
        }

        for waiter in &woken {
            waiter.notify.notify_one();
        }
        if !woken.is_empty() {
            debug!(woken = woken.len(), "Woke blocked waiters");
        }
        woken.len()
    }

    /// Number of waiters queued on `key`.
    pub fn waiting_on(&self, key: &[u8]) -> usize {
        self.queues.lock().get(key).map_or(0, VecDeque::len)
    }

    /// Number of keys with at least one waiter.
    pub fn blocked_keys(&self) -> usize {
        self.queues.lock().len()
    }

    fn unqueue(queues: &mut HashMap<Bytes, VecDeque<Arc<Waiter>>>, key: &[u8], id: u64) {
        if let Some(queue) = queues.get_mut(key) {
            queue.retain(|w| w.id != id);
            if queue.is_empty() {
                queues.remove(key);
            }
        }
    }
}

/// A caller's registration with the [`BlockingCoordinator`].
///
/// Dropping the handle before completion cancels the wait. That is always
/// safe and never leaks the registration.
#[derive(Debug)]
pub struct Registration {
    coordinator: Arc<BlockingCoordinator>,
    waiter: Arc<Waiter>,
}

impl Registration {
    /// Parks until signalled, `deadline` passes, or `cancel` fires.
    ///
    /// `None` for `deadline` waits indefinitely.
    pub async fn wait(&self, deadline: Option<Instant>, cancel: Option<&CancelToken>) -> Wake {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            self.finish(WaitOutcome::Cancelled, None);
            return Wake::Cancelled;
        }

        let clock = Arc::clone(&self.coordinator.clock);
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep(at.saturating_duration_since(clock.now())).await,
                None => future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.waiter.notify.notified() => Wake::Signalled,
            _ = cancelled => {
                self.finish(WaitOutcome::Cancelled, None);
                Wake::Cancelled
            }
            _ = expired => {
                // A signal that raced the deadline still gets one look.
                if self.is_signalled() {
                    Wake::Signalled
                } else {
                    self.finish(WaitOutcome::TimedOut, None);
                    Wake::TimedOut
                }
            }
        }
    }

    /// Puts a signalled waiter back at the head of its queues after it lost
    /// the race for the data.
    pub fn rearm(&self) {
        let mut queues = self.coordinator.queues.lock();
        let mut state = self.waiter.state.lock();
        if let WaiterState::Signalled(_) = *state {
            *state = WaiterState::Waiting;
            for key in &self.waiter.keys {
                queues
                    .entry(key.clone())
                    .or_default()
                    .push_front(Arc::clone(&self.waiter));
            }
            trace!(waiter = self.waiter.id, "Waiter re-armed after losing race");
        }
    }

    /// Marks the wait as satisfied by data taken from `key`.
    pub fn complete(self, key: &[u8]) {
        self.finish(WaitOutcome::Satisfied, Some(key));
    }

    /// The final outcome, once there is one.
    pub fn outcome(&self) -> Option<WaitOutcome> {
        match *self.waiter.state.lock() {
            WaiterState::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    fn is_signalled(&self) -> bool {
        matches!(*self.waiter.state.lock(), WaiterState::Signalled(_))
    }

    /// Moves the waiter to a final state and removes it from every queue.
    ///
    /// A signal that was received but not consumed is forwarded to the next
    /// waiter on the same key.
    fn finish(&self, outcome: WaitOutcome, consumed: Option<&[u8]>) {
        let forward = {
            let mut queues = self.coordinator.queues.lock();
            for key in &self.waiter.keys {
                BlockingCoordinator::unqueue(&mut queues, key, self.waiter.id);
            }

            let mut state = self.waiter.state.lock();
            match std::mem::replace(&mut *state, WaiterState::Done(outcome)) {
                WaiterState::Signalled(key) if consumed != Some(key.as_ref()) => Some(key),
                WaiterState::Done(previous) => {
                    *state = WaiterState::Done(previous);
                    None
                }
                _ => None,
            }
        };

        match outcome {
            WaitOutcome::Satisfied => trace!(waiter = self.waiter.id, "Waiter satisfied"),
            WaitOutcome::TimedOut => debug!(waiter = self.waiter.id, "Blocking wait timed out"),
            WaitOutcome::Cancelled => debug!(waiter = self.waiter.id, "Blocking wait cancelled"),
        }

        if let Some(key) = forward {
            self.coordinator.notify(&key, 1);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.outcome().is_none() {
            self.finish(WaitOutcome::Cancelled, None);
        }
    }
}
