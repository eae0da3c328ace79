//! Bounded FIFO admission queue.
//!
//! Admitted records wait here until the heartbeat promotes them. The queue
//! doubles as the heartbeat's scan list: each pass rotates not-yet-due
//! records back to the tail, so it is a circular review queue rather than a
//! priority structure. Admission is non-blocking; a full queue sheds the
//! producer instead of parking it.

use std::{
    collections::VecDeque,
    sync::Mutex,
};

use ghost_core::ScheduledRequest;

/// Outcome of a single scan step, decided by the heartbeat's closure.
pub enum ScanStep {
    /// Record is not ready; put it back at the tail and continue the pass.
    Requeue(ScheduledRequest),
    /// Record was handed to a worker; continue the pass.
    Taken,
    /// No capacity to take the record; put it back and stop the pass.
    Hold(ScheduledRequest),
}

/// Bounded multi-producer FIFO of admitted, not-yet-dispatched records.
pub struct AdmissionQueue {
    inner: Mutex<VecDeque<ScheduledRequest>>,
    capacity: usize,
}

impl AdmissionQueue {
    /// Creates a queue bounded at `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    /// Attempts to enqueue a record without blocking.
    ///
    /// Returns the record back unchanged when the queue is full so the
    /// caller can report the rejection; no state changes in that case.
    pub fn try_push(&self, request: ScheduledRequest) -> std::result::Result<(), ScheduledRequest> {
        let mut queue = self.inner.lock().expect("admission queue lock poisoned");
        if queue.len() >= self.capacity {
            return Err(request);
        }
        queue.push_back(request);
        Ok(())
    }

    /// Performs one heartbeat pass over the queue.
    ///
    /// Pops each record in FIFO order and lets `step` decide its fate. The
    /// pass is bounded by the queue length observed at pass start, so
    /// records requeued during the pass are not re-examined in the same
    /// tick. The lock is held for the whole pass, which keeps the capacity
    /// bound exact against concurrent producers; the closure must not block.
    pub fn scan<F>(&self, mut step: F)
    where
        F: FnMut(ScheduledRequest) -> ScanStep,
    {
        let mut queue = self.inner.lock().expect("admission queue lock poisoned");
        let pass_len = queue.len();
        for _ in 0..pass_len {
            let Some(request) = queue.pop_front() else {
                break;
            };
            match step(request) {
                ScanStep::Requeue(request) => queue.push_back(request),
                ScanStep::Taken => {}
                ScanStep::Hold(request) => {
                    queue.push_back(request);
                    break;
                }
            }
        }
    }

    /// Current number of queued records.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("admission queue lock poisoned").len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
