use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// One queued dispatch of a job
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct QueuedJob {
    pub job_id: String,
    /// Priority tier, lower is more urgent
    pub priority: u8,
    /// Monotonic enqueue sequence; gives FIFO order within a tier
    seq: u64,
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert so the lowest (priority, seq)
        // pair pops first
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority-ordered job queue; FIFO within a priority tier.
pub struct JobQueue {
    heap: Mutex<BinaryHeap<QueuedJob>>,
    notify: Notify,
    sequence: AtomicU64,
}

impl JobQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            sequence: AtomicU64::new(0),
        })
    }

    pub async fn push(&self, job_id: String, priority: u8) {
        let entry = QueuedJob {
            job_id,
            priority,
            seq: self.sequence.fetch_add(1, AtomicOrdering::Relaxed),
        };
        self.heap.lock().await.push(entry);
        self.notify.notify_one();
    }

    /// Pop the most urgent entry, waiting until one is available.
    pub async fn pop(&self) -> QueuedJob {
        loop {
            let notified = self.notify.notified();
            if let Some(entry) = self.heap.lock().await.pop() {
                // Wake the next waiter in case several entries arrived on
                // one notification
                self.notify.notify_one();
                return entry;
            }
            notified.await;
        }
    }

    pub async fn try_pop(&self) -> Option<QueuedJob> {
        self.heap.lock().await.pop()
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

    #[tokio::test]
    async fn test_lower_priority_value_pops_first() {
        let queue = JobQueue::new();
        queue.push("low".to_string(), 9).await;
        queue.push("urgent".to_string(), 1).await;
        queue.push("middle".to_string(), 5).await;

        assert_eq!(queue.pop().await.job_id, "urgent");
        assert_eq!(queue.pop().await.job_id, "middle");
        assert_eq!(queue.pop().await.job_id, "low");
    }

    #[test]
    fn test_fifo_within_a_tier() {
        tokio_test::block_on(async {
            let queue = JobQueue::new();
            for name in ["a", "b", "c"] {
                queue.push(name.to_string(), 5).await;
            }

            assert_eq!(queue.pop().await.job_id, "a");
            assert_eq!(queue.pop().await.job_id, "b");
            assert_eq!(queue.pop().await.job_id, "c");
        });
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = JobQueue::new();
        let waiter = Arc::clone(&queue);
        let handle = tokio::spawn(async move { waiter.pop().await.job_id });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.push("late".to_string(), 3).await;

        let popped = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("pop should resolve")
            .unwrap();
        assert_eq!(popped, "late");
    }
}
