//! Thread-safe FIFO of tasks that have become due.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// A FIFO shared between background triggers (producers) and the
/// dispatcher (sole consumer).
#[derive(Debug)]
pub struct ReadyQueue<T> {
    queue: Mutex<VecDeque<T>>,
}

impl<T> Default for ReadyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReadyQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an item. Only ever waits on the queue lock.
    pub fn push(&self, item: T) {
        self.queue.lock().push_back(item);
    }

    /// Take every queued item in arrival order.
    ///
    /// Items pushed after the swap land in the next batch.
    #[must_use]
    pub fn drain_all(&self) -> Vec<T> {
        let batch = std::mem::take(&mut *self.queue.lock());
        Vec::from(batch)
    }

    /// Drop every queued item, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Get the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_drain_all_empties_queue() {
        let queue = ReadyQueue::new();
        queue.push("a");
        queue.push("b");

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain_all(), vec!["a", "b"]);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn test_clear_reports_dropped_count() {
        let queue = ReadyQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(ReadyQueue::new());
        let producers: Vec<_> = (0..4u32)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for item in 0..250u32 {
                        queue.push((producer, item));
                    }
                })
            })
            .collect();

        for producer in producers {
            assert!(producer.join().is_ok());
        }

        let drained = queue.drain_all();
        assert_eq!(drained.len(), 1000);

        // Per-producer order is preserved.
        for producer in 0..4u32 {
            let items: Vec<u32> = drained
                .iter()
                .filter(|(p, _)| *p == producer)
                .map(|(_, item)| *item)
                .collect();
            assert_eq!(items, (0..250).collect::<Vec<_>>());
        }
    }

    proptest! {
        #[test]
        fn prop_drain_preserves_arrival_order(
            items in proptest::collection::vec(any::<u32>(), 0..100),
        ) {
            let queue = ReadyQueue::new();
            for item in &items {
                queue.push(*item);
            }
            prop_assert_eq!(queue.drain_all(), items);
            prop_assert!(queue.is_empty());
        }
    }
}
