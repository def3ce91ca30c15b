//! Blocking priority queue shared by the dispatch workers.

use crate::request::{lock, Dispatch};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Heap slot ordered so the request that should run next is the greatest.
///
/// `slot` is the push order within this queue, so a re-pushed request lands
/// behind everything of its priority that is already waiting.
pub(crate) struct QueuedRequest {
    slot: u64,
    request: Arc<dyn Dispatch>,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first, then earlier push first
        self.request
            .core()
            .priority()
            .cmp(&other.request.core().priority())
            .then_with(|| other.slot.cmp(&self.slot))
    }
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.request.core();
        f.debug_struct("QueuedRequest")
            .field("priority", &core.priority())
            .field("slot", &self.slot)
            .field("sequence", &core.sequence())
            .finish()
    }
}

/// Priority queue with an async blocking `take`.
///
/// `take` is cancel-safe: an item is only removed by the synchronous pop, so
/// dropping the future never loses a request.
#[derive(Default)]
pub struct PriorityQueue {
    heap: Mutex<BinaryHeap<QueuedRequest>>,
    pushed: AtomicU64,
    available: Notify,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: Arc<dyn Dispatch>) {
        let mut heap = lock(&self.heap);
        let slot = self.pushed.fetch_add(1, AtomicOrdering::Relaxed);
        heap.push(QueuedRequest { slot, request });
        drop(heap);
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<Arc<dyn Dispatch>> {
        lock(&self.heap).pop().map(|q| q.request)
    }

    /// Wait until a request is available and remove it.
    pub async fn take(&self) -> Arc<dyn Dispatch> {
        loop {
            if let Some(request) = self.try_pop() {
                return request;
            }
            self.available.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.heap).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.len())
            .finish()
    }
}
