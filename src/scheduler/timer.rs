use super::Job;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct Timed<D> {
    due: D,
    seq: u64,
    job: Job,
}

impl<D: Ord> PartialEq for Timed<D> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<D: Ord> Eq for Timed<D> {}

impl<D: Ord> PartialOrd for Timed<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<D: Ord> Ord for Timed<D> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Jobs ordered by due time, FIFO among equal due times.
///
/// `D` is a wall-clock `Instant` for real lanes and a virtual `Duration`
/// for the test scheduler.
pub(crate) struct TimerQueue<D> {
    heap: BinaryHeap<Reverse<Timed<D>>>,
    seq: u64,
}

impl<D: Ord + Copy> TimerQueue<D> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub(crate) fn push(&mut self, due: D, job: Job) {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        self.heap.push(Reverse(Timed { due, seq, job }));
    }

    #[inline]
    pub(crate) fn next_due(&self) -> Option<D> {
        self.heap.peek().map(|t| t.0.due)
    }

    /// Pop the earliest job if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: D) -> Option<(D, Job)> {
        if self.next_due()? <= now {
            self.heap.pop().map(|t| (t.0.due, t.0.job))
        } else {
            None
        }
    }

    /// Pop the earliest job regardless of its due time.
    pub(crate) fn pop(&mut self) -> Option<(D, Job)> {
        self.heap.pop().map(|t| (t.0.due, t.0.job))
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}
