use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::{Admission, Priority, RejectedError, Ticket};

pub(crate) type AdmitReply = oneshot::Sender<Result<Ticket, RejectedError>>;

/// A queued admission waiting for dispatch.
pub(crate) struct AdmitRequest {
    pub admission: Admission,
    pub submitted_at: Instant,
    pub reply: AdmitReply,
}

impl AdmitRequest {
    /// The caller dropped its admit future; skip without consuming budget.
    pub fn cancelled(&self) -> bool {
        self.reply.is_closed()
    }
}

/// Pending requests for one route bucket, split by priority class.
///
/// Also carries the bucket's wake bookkeeping: its scheduled wake time and
/// its slot in the wake heap, so heap reschedules stay O(log n).
pub(crate) struct BucketQueue {
    pub region: String,
    pub name: String,
    high: VecDeque<AdmitRequest>,
    normal: VecDeque<AdmitRequest>,
    pub wake_at: Option<Instant>,
    pub heap_index: Option<usize>,
}

impl BucketQueue {
    pub fn new(region: String, name: String) -> Self {
        Self {
            region,
            name,
            high: VecDeque::new(),
            normal: VecDeque::new(),
            wake_at: None,
            heap_index: None,
        }
    }

    pub fn depth(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    pub fn enqueue(&mut self, req: AdmitRequest) {
        match req.admission.priority {
            Priority::High => self.high.push_back(req),
            Priority::Normal => self.normal.push_back(req),
        }
    }

    /// Re-inserts a deferred request at the head of its class, so FIFO order
    /// within the class survives a postponed dispatch.
    pub fn requeue_front(&mut self, req: AdmitRequest) {
        match req.admission.priority {
            Priority::High => self.high.push_front(req),
            Priority::Normal => self.normal.push_front(req),
        }
    }

    /// Pops the next request whose caller is still waiting; high before
    /// normal, FIFO within each class. Cancelled requests are discarded.
    pub fn dequeue_valid(&mut self) -> Option<AdmitRequest> {
        while let Some(req) = self.high.pop_front() {
            if !req.cancelled() {
                return Some(req);
            }
        }
        while let Some(req) = self.normal.pop_front() {
            if !req.cancelled() {
                return Some(req);
            }
        }
        None
    }
}
