//! Hand-off of raw samples from engine workers onto the supervisor lane
//!
//! Pump tasks call [`EventMarshaller::post`] from whatever context the engine
//! runs on; the lane wakes on [`EventMarshaller::ready`] and drains the queue
//! in FIFO order. Once the queue holds `capacity` samples a new non-terminal
//! sample overwrites the newest queued sample of its own subscription instead
//! of growing the queue, so under overload the latest sample survives and
//! terminal samples are never lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::debug;

use crate::domain::{ProgressEvent, StreamKey};

/// A raw sample tagged with the subscription that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub stream: StreamKey,
    pub subscription: u64,
    pub sample: ProgressEvent,
}

/// What `post` did with a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Queued,
    /// Replaced an older queued sample of the same subscription
    Coalesced,
}

struct Inner {
    queue: Mutex<VecDeque<Envelope>>,
    notify: Notify,
    capacity: usize,
    coalesced: AtomicU64,
}

/// Bounded FIFO shared between pump tasks and the lane
#[derive(Clone)]
pub struct EventMarshaller {
    inner: Arc<Inner>,
}

impl EventMarshaller {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventMarshaller::new: called");
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
                notify: Notify::new(),
                capacity: capacity.max(1),
                coalesced: AtomicU64::new(0),
            }),
        }
    }

    /// Queue a sample and wake the lane
    pub fn post(&self, envelope: Envelope) -> PostOutcome {
        let outcome = {
            let mut queue = self.lock();
            match Self::coalesce_target(&queue, &envelope, self.inner.capacity) {
                Some(index) => {
                    queue[index].sample = envelope.sample;
                    self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    PostOutcome::Coalesced
                }
                None => {
                    queue.push_back(envelope);
                    PostOutcome::Queued
                }
            }
        };
        self.inner.notify.notify_one();
        outcome
    }

    fn coalesce_target(queue: &VecDeque<Envelope>, envelope: &Envelope, capacity: usize) -> Option<usize> {
        if queue.len() < capacity || envelope.sample.is_terminal() {
            return None;
        }
        let (index, newest) = queue
            .iter()
            .enumerate()
            .rev()
            .find(|(_, queued)| queued.subscription == envelope.subscription && queued.stream == envelope.stream)?;
        (!newest.sample.is_terminal()).then_some(index)
    }

    /// Take every queued sample in posting order
    pub fn drain(&self) -> Vec<Envelope> {
        self.lock().drain(..).collect()
    }

    /// Wait until something was posted since the last wake-up
    pub async fn ready(&self) {
        self.inner.notify.notified().await;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Samples overwritten under overload since creation
    pub fn coalesced(&self) -> u64 {
        self.inner.coalesced.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Envelope>> {
        self.inner.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
