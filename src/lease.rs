//! One-shot, cancelable lease timers.
//!
//! A [`LeaseTimer`] runs its expiry callback on a tokio task after the lease
//! duration elapses. Canceling (or dropping) the timer aborts that task. The
//! callback must still re-check ownership under the store lock: abort only
//! takes effect at the task's next suspension point, so a timer that already
//! woke up can race a concurrent renew.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug)]
pub struct LeaseTimer {
    handle: JoinHandle<()>,
    deadline: Instant,
}

impl LeaseTimer {
    /// Starts a timer that calls `on_expire` once after `ttl`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(ttl: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + ttl;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_expire();
        });
        Self { handle, deadline }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for LeaseTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
