use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::sync::oneshot;
use uuid::Uuid;

use super::slots::SlotClass;

/// A request parked on the gate, waiting for a slot.
pub(crate) struct QueuedRequest {
    /// Correlation id for log lines about this waiter.
    pub request_id: Uuid,
    /// Lower = higher priority. 0.0 for RT, 1.0 for fresh BE, in between
    /// once aging has kicked in.
    pub priority_score: f64,
    /// Clock seconds at enqueue. Negated in RT LIFO mode so the newest
    /// arrival sorts first.
    pub enqueue_time: f64,
    /// Class requested at enqueue; flipped to true when a BE entry is
    /// promoted into the RT queue.
    pub high_priority: bool,
    /// Wakes the parked caller, carrying the pool class being handed off.
    pub waker: oneshot::Sender<SlotClass>,
}

// Manual Debug impl since oneshot::Sender doesn't implement Debug
impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("request_id", &self.request_id)
            .field("priority_score", &self.priority_score)
            .field("enqueue_time", &self.enqueue_time)
            .field("high_priority", &self.high_priority)
            .finish()
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap; comparisons are reversed so the smallest
// (priority_score, enqueue_time) pair pops first.
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority_score
            .total_cmp(&self.priority_score)
            .then_with(|| other.enqueue_time.total_cmp(&self.enqueue_time))
    }
}

/// Min-ordered wait queue for one traffic class.
#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    heap: BinaryHeap<QueuedRequest>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: QueuedRequest) {
        self.heap.push(request);
    }

    /// Remove and return the best-priority waiter.
    pub fn pop(&mut self) -> Option<QueuedRequest> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Take every entry out (in no particular order) for a rebuild pass.
    pub fn drain(&mut self) -> Vec<QueuedRequest> {
        self.heap.drain().collect()
    }

    /// Drop entries whose waiter has gone away. Returns how many were
    /// removed.
    pub fn purge_closed(&mut self) -> usize {
        let before = self.heap.len();
        let live: Vec<QueuedRequest> = self
            .heap
            .drain()
            .filter(|request| !request.waker.is_closed())
            .collect();
        self.heap = live.into_iter().collect();
        before - self.heap.len()
    }
}
