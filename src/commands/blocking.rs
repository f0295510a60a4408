//! Blocking sequence commands.
//!
//! A blocking command first tries to make progress like its non-blocking
//! counterpart. Only when every key is empty does it register with the
//! [`BlockingCoordinator`](crate::storage::BlockingCoordinator), re-check
//! (data may have arrived in between), and park. Each wake-up is followed by
//! another attempt; a waiter that loses the race to another consumer goes
//! back to the head of the queue.

use bytes::Bytes;
use std::time::Duration;
use tracing::trace;

use super::command::End;
use super::handler::{require_args, sequence_mut, CommandExecutor};
use crate::error::{StoreError, StoreResult};
use crate::storage::{CancelToken, Wake};

impl CommandExecutor {
    /// Runs `attempt` until it yields a value, the timeout elapses or the
    /// caller cancels.
    ///
    /// `attempt` returns the key it took data from together with the result.
    /// A zero `timeout` waits indefinitely.
    async fn block_on<T>(
        &self,
        keys: &[Bytes],
        timeout: Duration,
        cancel: Option<&CancelToken>,
        mut attempt: impl FnMut() -> StoreResult<Option<(Bytes, T)>>,
    ) -> StoreResult<T> {
        if let Some((_, value)) = attempt()? {
            return Ok(value);
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(StoreError::Cancelled);
        }

        // A timeout too large to represent waits indefinitely, like zero.
        let deadline = if timeout.is_zero() {
            None
        } else {
            self.keyspace.now().checked_add(timeout)
        };
        let registration = self.blocking.register(keys);

        // A push between the first attempt and registration woke nobody.
        if let Some((key, value)) = attempt()? {
            registration.complete(&key);
            return Ok(value);
        }

        loop {
            match registration.wait(deadline, cancel).await {
                Wake::Signalled => match attempt()? {
                    Some((key, value)) => {
                        registration.complete(&key);
                        return Ok(value);
                    }
                    None => {
                        trace!("Woken waiter lost the race, re-arming");
                        registration.rearm();
                    }
                },
                Wake::TimedOut => return Err(StoreError::Timeout),
                Wake::Cancelled => return Err(StoreError::Cancelled),
            }
        }
    }

    /// Pops one element from the first non-empty key, in argument order.
    fn pop_first(&self, keys: &[Bytes], end: End) -> StoreResult<Option<(Bytes, Bytes)>> {
        for key in keys {
            let popped = self.keyspace.update(key, |slot, _| {
                Ok(sequence_mut(slot)?.and_then(|list| match end {
                    End::Left => list.pop_front(),
                    End::Right => list.pop_back(),
                }))
            })?;
            if let Some(value) = popped {
                return Ok(Some((key.clone(), value)));
            }
        }
        Ok(None)
    }

    /// BLPOP / BRPOP key [key ...] timeout
    ///
    /// Returns the key that was popped from and the element. When several
    /// keys have data the first one in argument order wins.
    pub async fn blocking_pop(
        &self,
        keys: &[Bytes],
        end: End,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> StoreResult<(Bytes, Bytes)> {
        require_args(keys, "bpop")?;
        self.block_on(keys, timeout, cancel, || {
            Ok(self
                .pop_first(keys, end)?
                .map(|(key, value)| (key.clone(), (key, value))))
        })
        .await
    }

    /// BLPOP key [key ...] timeout
    pub async fn blocking_pop_left(
        &self,
        keys: &[Bytes],
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> StoreResult<(Bytes, Bytes)> {
        self.blocking_pop(keys, End::Left, timeout, cancel).await
    }

    /// BRPOP key [key ...] timeout
    pub async fn blocking_pop_right(
        &self,
        keys: &[Bytes],
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> StoreResult<(Bytes, Bytes)> {
        self.blocking_pop(keys, End::Right, timeout, cancel).await
    }

    /// BLMOVE source destination LEFT|RIGHT LEFT|RIGHT timeout
    pub async fn blocking_move(
        &self,
        source: &Bytes,
        destination: &Bytes,
        from: End,
        to: End,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> StoreResult<Bytes> {
        let keys = [source.clone()];
        self.block_on(&keys, timeout, cancel, || {
            Ok(self
                .move_element(source, destination, from, to)?
                .map(|value| (source.clone(), value)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Keyspace;
    use std::sync::Arc;

    fn create_executor() -> CommandExecutor {
        CommandExecutor::new(Arc::new(Keyspace::new()))
    }

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    async fn wait_for_waiters(exec: &CommandExecutor, key: &[u8], n: usize) {
        while exec.coordinator().waiting_on(key) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_returns_immediately_when_data_present() {
        let exec = create_executor();
        exec.push_right(&b("q"), vec![b("a"), b("b")]).unwrap();

        let popped = exec
            .blocking_pop_left(&[b("q")], Duration::from_secs(1), None)
            .await;
        assert_eq!(popped, Ok((b("q"), b("a"))));
        assert_eq!(exec.coordinator().blocked_keys(), 0);
    }

    #[tokio::test]
    async fn test_first_key_in_argument_order_wins() {
        let exec = create_executor();
        exec.push_right(&b("second"), vec![b("2")]).unwrap();
        exec.push_right(&b("first"), vec![b("1")]).unwrap();

        let popped = exec
            .blocking_pop_right(&[b("empty"), b("first"), b("second")], Duration::ZERO, None)
            .await;
        assert_eq!(popped, Ok((b("first"), b("1"))));
    }

    #[tokio::test]
    async fn test_wakes_on_push() {
        let exec = create_executor();
        let consumer = exec.clone();
        let handle = tokio::spawn(async move {
            consumer
                .blocking_pop_left(&[b("q")], Duration::from_secs(5), None)
                .await
        });

        wait_for_waiters(&exec, b"q", 1).await;
        exec.push_right(&b("q"), vec![b("hello")]).unwrap();

        assert_eq!(handle.await.unwrap(), Ok((b("q"), b("hello"))));
        assert!(!exec.keyspace().exists(b"q"));
    }

    #[tokio::test]
    async fn test_fifo_between_waiters() {
        let exec = create_executor();

        let first = exec.clone();
        let w1 = tokio::spawn(async move {
            first
                .blocking_pop_left(&[b("q")], Duration::from_secs(5), None)
                .await
        });
        wait_for_waiters(&exec, b"q", 1).await;

        let second = exec.clone();
        let w2 = tokio::spawn(async move {
            second
                .blocking_pop_left(&[b("q")], Duration::from_millis(200), None)
                .await
        });
        wait_for_waiters(&exec, b"q", 2).await;

        exec.push_left(&b("q"), vec![b("only")]).unwrap();

        assert_eq!(w1.await.unwrap(), Ok((b("q"), b("only"))));
        assert_eq!(w2.await.unwrap(), Err(StoreError::Timeout));
    }

    #[tokio::test]
    async fn test_timeout() {
        let exec = create_executor();
        let result = exec
            .blocking_pop_left(&[b("q")], Duration::from_millis(30), None)
            .await;
        assert_eq!(result, Err(StoreError::Timeout));
        assert_eq!(exec.coordinator().waiting_on(b"q"), 0);
    }

    #[tokio::test]
    async fn test_cancel_infinite_wait() {
        let exec = create_executor();
        let token = CancelToken::new();

        let consumer = exec.clone();
        let waiter_token = token.clone();
        let handle = tokio::spawn(async move {
            consumer
                .blocking_pop_left(&[b("q")], Duration::ZERO, Some(&waiter_token))
                .await
        });

        wait_for_waiters(&exec, b"q", 1).await;
        token.cancel();

        assert_eq!(handle.await.unwrap(), Err(StoreError::Cancelled));
        assert_eq!(exec.coordinator().waiting_on(b"q"), 0);

        // Data pushed after cancellation stays put.
        exec.push_right(&b("q"), vec![b("x")]).unwrap();
        assert_eq!(exec.seq_len(b"q"), Ok(1));
    }

    #[tokio::test]
    async fn test_huge_timeout_parks_until_push() {
        let exec = create_executor();
        let consumer = exec.clone();
        let handle = tokio::spawn(async move {
            consumer
                .blocking_pop_left(&[b("q")], Duration::MAX, None)
                .await
        });

        wait_for_waiters(&exec, b"q", 1).await;
        assert!(!handle.is_finished());
        exec.push_right(&b("q"), vec![b("late")]).unwrap();

        assert_eq!(handle.await.unwrap(), Ok((b("q"), b("late"))));
    }

    #[tokio::test]
    async fn test_wrong_type_key_fails() {
        let exec = create_executor();
        exec.add(&b("set"), vec![b("m")]).unwrap();
        let result = exec
            .blocking_pop_left(&[b("set")], Duration::from_millis(10), None)
            .await;
        assert_eq!(result, Err(StoreError::WrongType));
    }

    #[tokio::test]
    async fn test_blocking_move() {
        let exec = create_executor();
        let consumer = exec.clone();
        let handle = tokio::spawn(async move {
            consumer
                .blocking_move(
                    &b("src"),
                    &b("dst"),
                    End::Left,
                    End::Right,
                    Duration::from_secs(5),
                    None,
                )
                .await
        });

        wait_for_waiters(&exec, b"src", 1).await;
        exec.push_right(&b("src"), vec![b("job")]).unwrap();

        assert_eq!(handle.await.unwrap(), Ok(b("job")));
        assert_eq!(exec.range(b"dst", 0, -1), Ok(vec![b("job")]));
    }

    #[tokio::test]
    async fn test_multi_key_wait_deregisters_everywhere() {
        let exec = create_executor();
        let consumer = exec.clone();
        let handle = tokio::spawn(async move {
            consumer
                .blocking_pop_left(&[b("a"), b("b")], Duration::from_secs(5), None)
                .await
        });

        wait_for_waiters(&exec, b"b", 1).await;
        exec.push_right(&b("b"), vec![b("x")]).unwrap();

        assert_eq!(handle.await.unwrap(), Ok((b("b"), b("x"))));
        assert_eq!(exec.coordinator().blocked_keys(), 0);
    }
}
