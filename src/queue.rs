//! # Priority Send Queue
//!
//! A totally ordered queue of outgoing parcels keyed by
//! `(priority-class, object-id, parcel-sequence)` (design document
//! §2/§4.1), feeding the transmit stage. Implemented as a `BinaryHeap`
//! guarded by a `tokio::sync::Mutex` with a `Notify` to wake the
//! transmit task — the heap-plus-custom-`Ord` shape is grounded in
//! `TokTok-rs-toxcore-c`'s `merkle-tox-core` delayed-packet queue
//! (`src/testing/hub.rs`), adapted from delivery-time ordering to
//! priority/object/sequence ordering.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::wire::parcel::{Parcel, ScheduleKey};

struct Entry {
    key: ScheduleKey,
    insertion: u64,
    parcel: Parcel,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.insertion == other.insertion
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Break exact key ties (two unbound signals at the same instant)
        // by insertion order, earliest first — a `BinaryHeap` max-heap
        // needs "earlier" to compare greater.
        self.key
            .cmp(&other.key)
            .then_with(|| other.insertion.cmp(&self.insertion))
    }
}

/// Bounded, priority-ordered queue of parcels awaiting transmission.
pub struct PriorityQueue {
    heap: Mutex<BinaryHeap<Entry>>,
    notify: Notify,
    space: Notify,
    next_insertion: AtomicU64,
    capacity: usize,
}

impl PriorityQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(PriorityQueue {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            space: Notify::new(),
            next_insertion: AtomicU64::new(0),
            capacity,
        })
    }

    /// Enqueue `parcel` at the schedule key derived from its own
    /// `(priority, object_id, sequence)` fields. Waits for capacity
    /// rather than dropping when the queue is at its bound, so a
    /// slow-draining (tempo-paced) transmit stage applies real
    /// backpressure to the producer instead of silently losing a
    /// parcel. Returns `false` only if `terminate` was observed set
    /// while waiting, meaning the connection is tearing down and the
    /// caller should stop producing further parcels for this object.
    pub async fn push(&self, parcel: Parcel, terminate: &AtomicBool) -> bool {
        self.push_with_key(parcel.schedule_key(), parcel, terminate).await
    }

    /// Enqueue `parcel` at an explicit key, used for unbound signals
    /// which are scheduled above the highest data priority regardless of
    /// their own `priority` field.
    pub async fn push_with_key(&self, key: ScheduleKey, parcel: Parcel, terminate: &AtomicBool) -> bool {
        loop {
            {
                let mut heap = self.heap.lock().await;
                if heap.len() < self.capacity {
                    let insertion = self.next_insertion.fetch_add(1, AtomicOrdering::Relaxed);
                    heap.push(Entry {
                        key,
                        insertion,
                        parcel,
                    });
                    drop(heap);
                    self.notify.notify_one();
                    return true;
                }
            }
            if terminate.load(AtomicOrdering::SeqCst) {
                return false;
            }
            self.space.notified().await;
            if terminate.load(AtomicOrdering::SeqCst) {
                return false;
            }
        }
    }

    /// Remove and return the highest-priority parcel, waiting if the
    /// queue is empty.
    pub async fn pop(&self) -> Parcel {
        loop {
            {
                let mut heap = self.heap.lock().await;
                if let Some(entry) = heap.pop() {
                    drop(heap);
                    self.space.notify_waiters();
                    return entry.parcel;
                }
            }
            self.notify.notified().await;
        }
    }

    /// As [`PriorityQueue::pop`], but returns `None` as soon as
    /// `terminate` is observed set, rather than waiting forever for a
    /// parcel that will never arrive. The transmit stage uses this to
    /// shut down promptly on connection close — callers must
    /// `notify_waiters()` (via [`PriorityQueue::wake_all`]) after
    /// setting the flag so a task already parked in `notified()` wakes.
    pub async fn pop_cancellable(&self, terminate: &AtomicBool) -> Option<Parcel> {
        loop {
            {
                let mut heap = self.heap.lock().await;
                if let Some(entry) = heap.pop() {
                    drop(heap);
                    self.space.notify_waiters();
                    return Some(entry.parcel);
                }
            }
            if terminate.load(AtomicOrdering::SeqCst) {
                return None;
            }
            self.notify.notified().await;
            if terminate.load(AtomicOrdering::SeqCst) {
                return None;
            }
        }
    }

    /// Wake any task currently parked in `pop`/`pop_cancellable`, or a
    /// producer parked in `push`/`push_with_key` waiting for capacity.
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
        self.space.notify_waiters();
    }

    /// Drop every queued parcel belonging to `object_id`, used when a
    /// transfer is cancelled mid-flight. Returns how many were dropped.
    pub async fn drop_object(&self, object_id: u64) -> usize {
        let mut heap = self.heap.lock().await;
        let before = heap.len();
        let kept: Vec<Entry> = heap
            .drain()
            .filter(|e| {
                e.parcel.object_id != object_id || e.parcel.channel == crate::wire::Channel::Signal
            })
            .collect();
        let dropped = before - kept.len();
        *heap = kept.into_iter().collect();
        drop(heap);
        if dropped > 0 {
            self.space.notify_waiters();
        }
        dropped
    }

    pub async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.heap.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::parcel::{Channel, Priority};
    use std::time::Duration;

    fn no_terminate() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[tokio::test]
    async fn pops_in_priority_then_object_then_sequence_order() {
        let q = PriorityQueue::new(16);
        let term = no_terminate();
        q.push(Parcel::data(Channel::Object, Priority::Low, 2, 0, None, vec![]), &term)
            .await;
        q.push(Parcel::data(Channel::Object, Priority::High, 1, 0, None, vec![]), &term)
            .await;
        q.push(Parcel::data(Channel::Object, Priority::High, 1, 1, None, vec![]), &term)
            .await;

        let first = q.pop().await;
        assert_eq!((first.priority, first.object_id, first.sequence), (Priority::High, 1, 0));
        let second = q.pop().await;
        assert_eq!((second.priority, second.object_id, second.sequence), (Priority::High, 1, 1));
        let third = q.pop().await;
        assert_eq!(third.priority, Priority::Low);
    }

    #[tokio::test]
    async fn push_blocks_past_capacity_until_space_frees_up() {
        let q = PriorityQueue::new(1);
        let term = no_terminate();
        assert!(
            q.push(Parcel::data(Channel::Object, Priority::Normal, 1, 0, None, vec![]), &term)
                .await
        );

        let q2 = q.clone();
        let waiter = tokio::spawn(async move {
            let term = no_terminate();
            q2.push(Parcel::data(Channel::Object, Priority::Normal, 2, 0, None, vec![]), &term)
                .await
        });

        // Give the waiter a chance to park on the full queue before we
        // free space; it must still be pending (not dropped).
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let freed = q.pop().await;
        assert_eq!(freed.object_id, 1);

        assert!(waiter.await.unwrap(), "push should succeed once space frees up");
        assert_eq!(q.len().await, 1);
    }

    #[tokio::test]
    async fn push_aborts_once_terminate_is_observed() {
        let q = PriorityQueue::new(1);
        let term = no_terminate();
        assert!(
            q.push(Parcel::data(Channel::Object, Priority::Normal, 1, 0, None, vec![]), &term)
                .await
        );

        let q2 = q.clone();
        let term = Arc::new(AtomicBool::new(false));
        let term2 = term.clone();
        let waiter = tokio::spawn(async move {
            q2.push(Parcel::data(Channel::Object, Priority::Normal, 2, 0, None, vec![]), &term2)
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        term.store(true, AtomicOrdering::SeqCst);
        q.wake_all();
        assert!(!waiter.await.unwrap(), "push should abort once terminate is set");
    }

    #[tokio::test]
    async fn unbound_signal_preempts_top_data() {
        let q = PriorityQueue::new(16);
        let term = no_terminate();
        q.push(Parcel::data(Channel::Object, Priority::Top, 1, 0, None, vec![]), &term)
            .await;
        q.push_with_key(ScheduleKey::unbound_signal(), Parcel::signal(Priority::Top, 0, vec![]), &term)
            .await;
        let first = q.pop().await;
        assert_eq!(first.channel, Channel::Signal);
    }

    #[tokio::test]
    async fn drop_object_removes_only_its_parcels() {
        let q = PriorityQueue::new(16);
        let term = no_terminate();
        q.push(Parcel::data(Channel::Object, Priority::Normal, 1, 0, None, vec![]), &term).await;
        q.push(Parcel::data(Channel::Object, Priority::Normal, 1, 1, None, vec![]), &term).await;
        q.push(Parcel::data(Channel::Object, Priority::Normal, 2, 0, None, vec![]), &term).await;
        q.drop_object(1).await;
        assert_eq!(q.len().await, 1);
        let remaining = q.pop().await;
        assert_eq!(remaining.object_id, 2);
    }
}
