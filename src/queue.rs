use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::{StreamError, StreamResult};
use crate::models::operation::QueueItem;

/// Fixed-capacity FIFO shared by every producer and every flusher.
///
/// `push` waits while the queue is full and `pop` waits while it is empty.
/// Once closed, pushes fail and pops on an empty queue return the shutdown
/// sentinel instead of waiting.
pub struct BoundedQueue {
    inner: Mutex<VecDeque<QueueItem>>,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
    capacity: usize,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueItem>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn push(&self, item: QueueItem) -> StreamResult<()> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut queue = self.lock();
                if self.is_closed() {
                    return Err(StreamError::Closed);
                }
                if queue.len() < self.capacity {
                    queue.push_back(item);
                    let room = queue.len() < self.capacity;
                    drop(queue);
                    self.not_empty.notify_one();
                    if room {
                        // Pass the wake-up on, another producer may be parked.
                        self.not_full.notify_one();
                    }
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    pub async fn pop(&self) -> QueueItem {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut queue = self.lock();
                if let Some(item) = queue.pop_front() {
                    let more = !queue.is_empty();
                    drop(queue);
                    self.not_full.notify_one();
                    if more {
                        self.not_empty.notify_one();
                    }
                    return item;
                }
                if self.is_closed() {
                    return QueueItem::Shutdown;
                }
            }
            notified.await;
        }
    }

    /// Approximate under concurrent use, only fit for heuristics.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every queued item and wakes producers waiting for room.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut queue = self.lock();
            let removed = queue.len();
            queue.clear();
            removed
        };
        self.not_full.notify_waiters();
        removed
    }

    /// Wakes producers waiting for room, only when nothing is queued.
    ///
    /// Never removes anything: an item pushed right before the check simply
    /// makes it a no-op.
    pub fn clear_if_empty(&self) -> bool {
        let empty = self.lock().is_empty();
        if empty {
            self.not_full.notify_waiters();
        }
        empty
    }

    pub fn close(&self) {
        {
            let _queue = self.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
