//! Keyed work queue feeding the reconcile workers.
//!
//! A key is held by at most one worker at a time. Adding a key that is being
//! processed marks it dirty; it is queued again once the worker calls
//! [`WorkQueue::done`]. Keys waiting in the queue are de-duplicated.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::backoff::Backoff;

#[derive(Default)]
struct Inner {
    queue: VecDeque<String>,
    /// Keys that need processing (queued, or re-added while processing).
    dirty: HashSet<String>,
    processing: HashSet<String>,
    /// Pending delayed adds; the earliest wins.
    scheduled: HashMap<String, Instant>,
    backoff: HashMap<String, Backoff>,
    shutting_down: bool,
}

pub struct WorkQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl WorkQueue {
    pub fn new(backoff_min: Duration, backoff_max: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            backoff_min,
            backoff_max,
        })
    }

    pub async fn add(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        if inner.shutting_down || !inner.dirty.insert(key.to_string()) {
            return;
        }
        if inner.processing.contains(key) {
            return;
        }
        inner.queue.push_back(key.to_string());
        drop(inner);
        self.notify.notify_one();
    }

    /// Add `key` once `delay` has elapsed. An earlier pending add for the same
    /// key is kept.
    pub async fn add_after(self: &Arc<Self>, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key).await;
            return;
        }
        let at = Instant::now() + delay;
        {
            let mut inner = self.inner.lock().await;
            if inner.shutting_down {
                return;
            }
            match inner.scheduled.get(key) {
                Some(existing) if *existing <= at => return,
                _ => {
                    inner.scheduled.insert(key.to_string(), at);
                }
            }
        }

        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            let fire = {
                let mut inner = queue.inner.lock().await;
                // Superseded by an earlier add_after, or forgotten.
                if inner.scheduled.get(&key) == Some(&at) {
                    inner.scheduled.remove(&key);
                    true
                } else {
                    false
                }
            };
            if fire {
                queue.add(&key).await;
            }
        });
    }

    /// Requeue `key` after its next backoff delay. Returns the delay.
    pub async fn add_backoff(self: &Arc<Self>, key: &str) -> Duration {
        let delay = {
            let mut inner = self.inner.lock().await;
            let (min, max) = (self.backoff_min, self.backoff_max);
            inner
                .backoff
                .entry(key.to_string())
                .or_insert_with(|| Backoff::new(min, max))
                .next_failure()
        };
        self.add_after(key, delay).await;
        delay
    }

    /// Clear the backoff of `key`.
    pub async fn reset_backoff(&self, key: &str) {
        self.inner.lock().await.backoff.remove(key);
    }

    /// Drop all scheduling state for `key`.
    pub async fn forget(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        inner.backoff.remove(key);
        inner.scheduled.remove(key);
    }

    pub async fn failures(&self, key: &str) -> u32 {
        self.inner
            .lock()
            .await
            .backoff
            .get(key)
            .map(Backoff::failures)
            .unwrap_or(0)
    }

    /// Wait for the next key. `None` once the queue is shut down.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().await;
                if inner.shutting_down {
                    return None;
                }
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release `key` after processing. Re-queues it if it was added meanwhile.
    pub async fn done(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        inner.processing.remove(key);
        if inner.dirty.contains(key) && !inner.shutting_down {
            inner.queue.push_back(key.to_string());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake all waiting workers.
    pub async fn shut_down(&self) {
        let mut inner = self.inner.lock().await;
        inner.shutting_down = true;
        inner.queue.clear();
        inner.scheduled.clear();
        drop(inner);
        self.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
