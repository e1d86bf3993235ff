use std::time::Instant;

use super::bucket_queue::BucketQueue;

#[derive(Debug, Clone, Copy)]
struct WakeEntry {
    at: Instant,
    slot: usize,
}

/// Min-heap of bucket arena slots ordered by wake time.
///
/// Buckets, not requests, populate the heap: one wake re-evaluates every
/// queued request in that bucket, since priority may override the previous
/// head. Each bucket stores its heap position (`heap_index`) so upserts and
/// removals avoid a scan. `std::collections::BinaryHeap` has no decrease-key,
/// hence the hand-rolled sift.
#[derive(Debug, Default)]
pub(crate) struct WakeHeap {
    entries: Vec<WakeEntry>,
}

impl WakeHeap {
    /// The earliest scheduled bucket and its wake time, if any.
    pub fn peek(&self) -> Option<(usize, Instant)> {
        self.entries.first().map(|entry| (entry.slot, entry.at))
    }

    /// Schedules or reschedules `slot`; `None` unschedules it.
    pub fn upsert(&mut self, buckets: &mut [BucketQueue], slot: usize, at: Option<Instant>) {
        let Some(at) = at else {
            self.remove(buckets, slot);
            return;
        };

        buckets[slot].wake_at = Some(at);
        match buckets[slot].heap_index {
            Some(pos) => {
                self.entries[pos].at = at;
                self.fix(buckets, pos);
            }
            None => {
                let pos = self.entries.len();
                self.entries.push(WakeEntry { at, slot });
                buckets[slot].heap_index = Some(pos);
                self.sift_up(buckets, pos);
            }
        }
    }

    /// Unschedules `slot` if present.
    pub fn remove(&mut self, buckets: &mut [BucketQueue], slot: usize) {
        buckets[slot].wake_at = None;
        let Some(pos) = buckets[slot].heap_index else {
            return;
        };
        buckets[slot].heap_index = None;
        self.detach(buckets, pos);
    }

    /// Pops the earliest bucket if its scheduled wake time has arrived.
    pub fn pop_due(&mut self, buckets: &mut [BucketQueue], now: Instant) -> Option<usize> {
        let (slot, _) = self.peek()?;
        if buckets[slot].wake_at.is_none_or(|at| at > now) {
            return None;
        }
        buckets[slot].heap_index = None;
        buckets[slot].wake_at = None;
        self.detach(buckets, 0);
        Some(slot)
    }

    /// Removes the entry at heap position `pos`, restoring heap order for
    /// whatever element takes its place.
    fn detach(&mut self, buckets: &mut [BucketQueue], pos: usize) {
        let last = self.entries.len() - 1;
        self.entries.swap(pos, last);
        self.entries.pop();

        if pos < self.entries.len() {
            buckets[self.entries[pos].slot].heap_index = Some(pos);
            self.fix(buckets, pos);
        }
    }

    fn fix(&mut self, buckets: &mut [BucketQueue], pos: usize) {
        let settled = self.sift_down(buckets, pos);
        if settled == pos {
            self.sift_up(buckets, pos);
        }
    }

    fn sift_up(&mut self, buckets: &mut [BucketQueue], mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.entries[pos].at >= self.entries[parent].at {
                break;
            }
            self.swap_entries(buckets, pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, buckets: &mut [BucketQueue], mut pos: usize) -> usize {
        loop {
            let left = 2 * pos + 1;
            if left >= self.entries.len() {
                break;
            }

            let mut child = left;
            let right = left + 1;
            if right < self.entries.len() && self.entries[right].at < self.entries[left].at {
                child = right;
            }
            if self.entries[child].at >= self.entries[pos].at {
                break;
            }

            self.swap_entries(buckets, pos, child);
            pos = child;
        }
        pos
    }

    fn swap_entries(&mut self, buckets: &mut [BucketQueue], a: usize, b: usize) {
        self.entries.swap(a, b);
        buckets[self.entries[a].slot].heap_index = Some(a);
        buckets[self.entries[b].slot].heap_index = Some(b);
    }
}
