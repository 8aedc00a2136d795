//! Bounded, non-blocking FIFO queues.
//!
//! Both the ingestion path (capture -> aggregator) and the write-behind path
//! (aggregator -> batch writer) sit on a [`BoundedQueue`]. Producers never
//! block: once the queue holds `capacity` items, new items are dropped and
//! counted.

use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Capacity-bounded FIFO with drop-on-full enqueue.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// `name` labels the drop counter exported as `<name>_dropped_total`.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append `item` unless the queue is full.
    ///
    /// Returns `false` when the item was dropped. Never blocks beyond the
    /// short critical section guarding the buffer.
    pub fn try_enqueue(&self, item: T) -> bool {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            drop(items);
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            metrics::increment_counter!(self.drop_metric());
            debug!("{} queue full, dropped item ({} dropped so far)", self.name, total);
            return false;
        }
        items.push_back(item);
        true
    }

    /// Remove and return everything currently queued, oldest first.
    pub fn drain_all(&self) -> Vec<T> {
        let mut items = self.items.lock();
        std::mem::take(&mut *items).into()
    }

    /// Remove and return at most `max` items, oldest first.
    pub fn drain_up_to(&self, max: usize) -> Vec<T> {
        let mut items = self.items.lock();
        let n = max.min(items.len());
        items.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn drop_metric(&self) -> &'static str {
        match self.name {
            "ingestion" => "ingestion_dropped_total",
            "persistence" => "persistence_dropped_total",
            _ => "queue_dropped_total",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_drops_newest() {
        let queue = BoundedQueue::new("test", 3);
        for i in 0..10 {
            queue.try_enqueue(i);
            assert!(queue.len() <= queue.capacity());
        }

        assert_eq!(queue.dropped(), 7);
        assert_eq!(queue.drain_all(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_up_to_keeps_remainder() {
        let queue = BoundedQueue::new("test", 10);
        for i in 0..5 {
            assert!(queue.try_enqueue(i));
        }

        assert_eq!(queue.drain_up_to(2), vec![0, 1]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain_up_to(100), vec![2, 3, 4]);
        assert!(queue.drain_up_to(100).is_empty());
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let queue = BoundedQueue::new("test", 0);
        assert!(!queue.try_enqueue("x"));
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_concurrent_producers_respect_capacity() {
        let queue = std::sync::Arc::new(BoundedQueue::new("test", 100));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.try_enqueue(i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 100);
        assert_eq!(queue.dropped(), 300);
    }
}
