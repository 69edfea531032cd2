// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

//! The time-and-size drain queue.
//!
//! Producers `put` entries concurrently; the queue coalesces them into
//! batches and hands each batch to the injected [`DrainSink`]. A drain is
//! triggered when a put fills the queue (size drain) or when the oldest
//! entry of the current non-empty episode reaches the configured age
//! (time drain).
//!
//! All drains execute on one background task, so at most one drain runs at
//! any instant. Triggers are messages to that task; a trigger that finds
//! its reason gone by the time it is handled (the queue no longer full, or
//! the episode it was armed for already drained) cancels itself.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Consumes one drained batch. The call may suspend; producers keep
/// putting while it runs and the next episode arms its own triggers.
pub type DrainSink<T> = Box<dyn Fn(Vec<T>) -> BoxFuture<'static, ()> + Send + Sync>;

/// When the queue drains: always on becoming full, and optionally when the
/// oldest queued entry has waited `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    pub maxsize: usize,
    pub timeout: Option<Duration>,
}

impl DrainPolicy {
    pub fn size_only(maxsize: usize) -> DrainPolicy {
        DrainPolicy {
            maxsize,
            timeout: None,
        }
    }

    pub fn time_and_size(maxsize: usize, timeout: Duration) -> DrainPolicy {
        DrainPolicy {
            maxsize,
            timeout: Some(timeout),
        }
    }
}

enum DrainTrigger {
    /// A put made the queue full. Stale if the queue is no longer full.
    Size,
    /// The episode that started at the captured instant timed out. Stale
    /// if that episode has already been drained.
    Time(Instant),
}

struct QueueState<T> {
    entries: VecDeque<T>,
    /// Start of the current non-empty episode; `None` iff the queue is empty.
    timestamp: Option<Instant>,
    /// The pending time-drain timer for the current episode.
    timer: Option<JoinHandle<()>>,
}

pub struct DrainQueue<T> {
    policy: DrainPolicy,
    state: Mutex<QueueState<T>>,
    space: Notify,
    triggers: UnboundedSender<DrainTrigger>,
}

impl<T: Send + 'static> DrainQueue<T> {
    /// Creates the queue and spawns its drainer task. The task exits when
    /// the queue is dropped. Must be called from within a tokio runtime.
    pub fn new(policy: DrainPolicy, sink: DrainSink<T>) -> Arc<DrainQueue<T>> {
        assert!(policy.maxsize > 0, "maxsize must be at least 1");
        let (triggers, trigger_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(DrainQueue {
            policy,
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                timestamp: None,
                timer: None,
            }),
            space: Notify::new(),
            triggers,
        });
        tokio::spawn(run_drains(Arc::downgrade(&queue), trigger_rx, sink));
        queue
    }

    /// Enqueues one entry, waiting while the queue is full. Entries leave
    /// the queue in the order they were put.
    pub async fn put(&self, entry: T) {
        let mut entry = Some(entry);
        loop {
            let mut notified = pin!(self.space.notified());
            notified.as_mut().enable();
            {
                let mut state = self.state.lock().unwrap();
                if state.entries.len() < self.policy.maxsize {
                    if state.entries.is_empty() {
                        self.begin_episode(&mut state);
                    }
                    state.entries.push_back(entry.take().expect("entry is put once"));
                    if state.entries.len() == self.policy.maxsize {
                        let _ = self.triggers.send(DrainTrigger::Size);
                    }
                    return;
                }
            }
            notified.await;
        }
    }

    /// Removes and returns all currently queued entries in FIFO order,
    /// ending the current episode.
    pub fn flush(&self) -> Vec<T> {
        let mut state = self.state.lock().unwrap();
        self.flush_locked(&mut state)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks the empty→non-empty transition: stamps the episode and arms
    /// its time drain.
    fn begin_episode(&self, state: &mut QueueState<T>) {
        let started = Instant::now();
        state.timestamp = Some(started);
        let Some(timeout) = self.policy.timeout else {
            return;
        };
        let triggers = self.triggers.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(started + timeout).await;
            let _ = triggers.send(DrainTrigger::Time(started));
        }));
    }

    fn flush_locked(&self, state: &mut QueueState<T>) -> Vec<T> {
        let batch: Vec<T> = state.entries.drain(..).collect();
        state.timestamp = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if !batch.is_empty() {
            self.space.notify_waiters();
        }
        batch
    }

    /// Applies the cancellation predicate for `trigger` and, if it still
    /// holds, extracts the batch.
    fn take_batch(&self, trigger: DrainTrigger) -> Option<Vec<T>> {
        let mut state = self.state.lock().unwrap();
        match trigger {
            DrainTrigger::Size => {
                if state.entries.len() < self.policy.maxsize {
                    trace!("size drain cancelled, queue no longer full");
                    return None;
                }
            }
            DrainTrigger::Time(armed) => {
                if state.timestamp != Some(armed) {
                    trace!("time drain cancelled, episode already drained");
                    return None;
                }
            }
        }
        Some(self.flush_locked(&mut state))
    }
}

impl<T> Drop for DrainQueue<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().unwrap().timer.take() {
            timer.abort();
        }
    }
}

/// The single drain executor. Holding only a weak reference lets the queue
/// (and this task) shut down once all owners are gone.
async fn run_drains<T: Send + 'static>(
    queue: Weak<DrainQueue<T>>,
    mut triggers: UnboundedReceiver<DrainTrigger>,
    sink: DrainSink<T>,
) {
    while let Some(trigger) = triggers.recv().await {
        let Some(queue) = queue.upgrade() else {
            return;
        };
        let batch = queue.take_batch(trigger);
        drop(queue);
        if let Some(batch) = batch {
            if !batch.is_empty() {
                sink(batch).await;
            }
        }
    }
}
