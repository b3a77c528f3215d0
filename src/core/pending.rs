//! Executions routed while every worker is busy at `max_workers`.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::PoolError;

/// An execution waiting for a worker. Its timeout clock starts at dispatch.
#[derive(Debug, Clone)]
pub struct PendingExecution {
    /// Execution identifier.
    pub execution_id: String,
    /// Timeout applied once dispatched.
    pub timeout: Duration,
    /// When the execution was queued.
    pub queued_at: Instant,
}

/// Bounded FIFO of pending executions.
#[derive(Debug)]
pub struct PendingQueue {
    max_depth: usize,
    items: VecDeque<PendingExecution>,
}

impl PendingQueue {
    /// Create a queue holding at most `max_depth` executions.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            items: VecDeque::with_capacity(max_depth.min(1024)),
        }
    }

    /// Append an execution; returns its 1-based position.
    ///
    /// # Errors
    ///
    /// `PoolError::Backpressure` when the queue is full.
    pub fn enqueue(&mut self, execution_id: &str, timeout: Duration) -> Result<usize, PoolError> {
        if self.items.len() >= self.max_depth {
            return Err(PoolError::Backpressure {
                pending: self.items.len(),
                capacity: self.max_depth,
            });
        }
        self.items.push_back(PendingExecution {
            execution_id: execution_id.to_owned(),
            timeout,
            queued_at: Instant::now(),
        });
        Ok(self.items.len())
    }

    /// Take the oldest execution.
    pub fn dequeue(&mut self) -> Option<PendingExecution> {
        self.items.pop_front()
    }

    /// Put an execution back at the head after a failed dispatch. It was
    /// already admitted, so the depth bound does not apply.
    pub fn requeue_front(&mut self, item: PendingExecution) {
        self.items.push_front(item);
    }

    /// Whether `execution_id` is waiting.
    #[must_use]
    pub fn contains(&self, execution_id: &str) -> bool {
        self.items.iter().any(|p| p.execution_id == execution_id)
    }

    /// Remove and return everything, oldest first.
    pub fn drain(&mut self) -> Vec<PendingExecution> {
        self.items.drain(..).collect()
    }

    /// Maximum depth.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Current depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
