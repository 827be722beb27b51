//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

/// A queue of pending timeouts, ordered by deadline.
///
/// Timeouts that share the same deadline fire in the order they were armed.
/// The queue never runs callbacks by itself: the owner of the event loop
/// collects the expired messages with [`TimerQueue::expired`] and dispatches
/// them, so a timeout never runs concurrently with anything else.
#[derive(Debug)]
pub struct TimerQueue<M> {
    inner: Arc<Mutex<TimerQueueInner<M>>>,
}

#[derive(Debug)]
struct TimerQueueInner<M> {
    timers: BTreeMap<TimerKey, M>,
    next_seq: u64,
}

type TimerKey = (Instant, u64);

/// A handle which can be used to inspect the timeout created by the
/// [`TimerQueue::timeout`] function.
///
/// Dropping this handle cancels the timeout. Cancellation is synchronous:
/// once the handle is gone the message can no longer be returned by
/// [`TimerQueue::expired`].
#[derive(Debug)]
pub struct TimeoutTask<M> {
    queue: Weak<Mutex<TimerQueueInner<M>>>,
    key: TimerKey,
}

// ===== impl TimerQueue =====

impl<M> TimerQueue<M> {
    pub fn new() -> TimerQueue<M> {
        TimerQueue {
            inner: Arc::new(Mutex::new(TimerQueueInner {
                timers: BTreeMap::new(),
                next_seq: 0,
            })),
        }
    }

    /// Arms a new timeout that expires `timeout` after `now`.
    ///
    /// Returns a handler that can be used to inspect or cancel the timeout.
    pub fn timeout(
        &self,
        now: Instant,
        timeout: Duration,
        msg: M,
    ) -> TimeoutTask<M> {
        let mut inner = self.lock();
        let key = (now + timeout, inner.next_seq);
        inner.next_seq += 1;
        inner.timers.insert(key, msg);

        TimeoutTask {
            queue: Arc::downgrade(&self.inner),
            key,
        }
    }

    /// Removes and returns the messages of all timeouts whose deadline is not
    /// later than `now`, earliest deadline first.
    pub fn expired(&self, now: Instant) -> Vec<M> {
        let mut inner = self.lock();
        let mut expired = vec![];
        while let Some(entry) = inner.timers.first_entry() {
            if entry.key().0 > now {
                break;
            }
            expired.push(entry.remove());
        }
        expired
    }

    /// Returns the deadline of the next timeout to expire, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Returns the number of armed timeouts.
    pub fn len(&self) -> usize {
        self.lock().timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().timers.is_empty()
    }

    /// Sleeps until the next deadline is reached and returns the current
    /// time. Never completes while the queue is empty.
    ///
    /// The deadline is sampled once, so callers must invoke this again after
    /// arming new timeouts (typically on every iteration of the event loop).
    pub async fn wait(&self) -> Instant {
        match self.next_deadline() {
            Some(deadline) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                tokio::time::sleep_until(deadline).await;
            }
            None => std::future::pending::<()>().await,
        }
        tokio::time::Instant::now().into_std()
    }

    fn lock(&self) -> MutexGuard<'_, TimerQueueInner<M>> {
        self.inner.lock().unwrap_or_else(|error| error.into_inner())
    }
}

impl<M> Clone for TimerQueue<M> {
    fn clone(&self) -> TimerQueue<M> {
        TimerQueue {
            inner: self.inner.clone(),
        }
    }
}

impl<M> Default for TimerQueue<M> {
    fn default() -> TimerQueue<M> {
        TimerQueue::new()
    }
}

// ===== impl TimeoutTask =====

impl<M> TimeoutTask<M> {
    /// Returns the instant at which the timeout expires.
    pub fn deadline(&self) -> Instant {
        self.key.0
    }

    /// Returns the remaining time before the timeout expires.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.key.0.saturating_duration_since(now)
    }

    /// Returns whether the timeout is still waiting in its queue.
    pub fn is_pending(&self) -> bool {
        match self.queue.upgrade() {
            Some(queue) => {
                let inner =
                    queue.lock().unwrap_or_else(|error| error.into_inner());
                inner.timers.contains_key(&self.key)
            }
            None => false,
        }
    }
}

impl<M> Drop for TimeoutTask<M> {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            let mut inner =
                queue.lock().unwrap_or_else(|error| error.into_inner());
            inner.timers.remove(&self.key);
        }
    }
}

// ===== unit tests =====
