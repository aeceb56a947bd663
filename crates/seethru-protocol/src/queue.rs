//! Bounded FIFO between the receive task and the state-machine task.
//!
//! ```text
//!   receive task ──put()──▶ [ m1 m2 m3 … ] ──take(timeout)──▶ state machine
//!                 waits while full         0 = wait forever
//! ```
//!
//! Both waits are plain futures: dropping them (e.g. losing a `select!`
//! against a cancellation token) abandons the wait without side effects.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use seethru_core::Message;
use tokio::sync::Notify;
use tokio::time::Instant;

pub const DEFAULT_CAPACITY: usize = 30;

pub struct HandoffQueue {
    items: Mutex<VecDeque<Message>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl HandoffQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Appends `message`, waiting while the queue is full.
    pub async fn put(&self, message: Message) {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent take() cannot slip between.
            notified.as_mut().enable();
            {
                let mut items = self.lock();
                if items.len() < self.capacity {
                    items.push_back(message);
                    drop(items);
                    self.not_empty.notify_one();
                    return;
                }
            }
            notified.await;
        }
    }

    /// Pops the head, waiting up to `timeout` for one to arrive.
    ///
    /// `Duration::ZERO` waits until a message is available. Returns `None`
    /// once a non-zero timeout elapses with the queue still empty.
    pub async fn take(&self, timeout: Duration) -> Option<Message> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_take() {
                return Some(message);
            }
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Pops the head without waiting.
    pub fn try_take(&self) -> Option<Message> {
        let message = self.lock().pop_front()?;
        self.not_full.notify_one();
        Some(message)
    }

    /// Drops every queued message and returns how many there were.
    ///
    /// On an empty queue nothing is touched and no waiter is woken.
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        if items.is_empty() {
            return 0;
        }
        let dropped = items.len();
        items.clear();
        drop(items);
        self.not_full.notify_waiters();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Message>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for HandoffQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
