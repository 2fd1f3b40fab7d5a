//! Trajectory cycle queue (spec §4.2) — a bounded ring buffer of
//! [`TrajectoryCycle`] segments with margin-based back-pressure.

use crate::tc::TrajectoryCycle;
use std::collections::VecDeque;

/// Bounded FIFO of pending/active trajectory segments.
///
/// `full()` trips [`crate::consts::TC_QUEUE_MARGIN`] entries before the
/// hard capacity, so a caller blocked on "queue has room" and a caller
/// racing to append one more segment can never deadlock against each
/// other.
#[derive(Debug)]
pub struct TcQueue {
    entries: VecDeque<TrajectoryCycle>,
    capacity: usize,
}

impl TcQueue {
    /// Build an empty queue with the given hard capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// True once occupancy is within [`crate::consts::TC_QUEUE_MARGIN`] of
    /// capacity — the sequencer should stop appending until this clears.
    pub fn full(&self) -> bool {
        self.entries.len() + crate::consts::TC_QUEUE_MARGIN >= self.capacity
    }

    /// True when nothing is queued or running.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append a new segment. Returns `false` without enqueuing if the
    /// queue is already at hard capacity (distinct from `full()`'s
    /// earlier soft limit — this is the last-resort guard against
    /// unbounded growth).
    pub fn push(&mut self, tc: TrajectoryCycle) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push_back(tc);
        true
    }

    /// The segment currently being run (queue head), if any.
    pub fn current(&self) -> Option<&TrajectoryCycle> {
        self.entries.front()
    }

    /// Mutable access to the segment currently being run.
    pub fn current_mut(&mut self) -> Option<&mut TrajectoryCycle> {
        self.entries.front_mut()
    }

    /// The segment immediately behind the current one, consulted by
    /// BLEND termination to decide whether to start accumulating its
    /// motion early (spec §4.3).
    pub fn next(&self) -> Option<&TrajectoryCycle> {
        self.entries.get(1)
    }

    /// Mutable access to the segment immediately behind the current one.
    pub fn next_mut(&mut self) -> Option<&mut TrajectoryCycle> {
        self.entries.get_mut(1)
    }

    /// Drop the head once it has retired (`TrajectoryCycle::is_done()`).
    pub fn pop_done(&mut self) -> Option<TrajectoryCycle> {
        if self.entries.front().is_some_and(|tc| tc.is_done()) {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Discard every queued segment (estop/abort).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Random read at offset `n` from the head, without removing it
    /// (spec §4.2 `item(n)`). Design-available alongside [`Self::current`]/
    /// [`Self::next`], which cover the only offsets the planner itself
    /// reads; not otherwise called by [`crate::tp::TrajectoryPlanner`].
    pub fn item(&self, n: usize) -> Option<&TrajectoryCycle> {
        self.entries.get(n)
    }

    /// The most recently queued (tail) segment (spec §4.2 `last`).
    pub fn last(&self) -> Option<&TrajectoryCycle> {
        self.entries.back()
    }

    /// Remove the segment at offset `n` from the head (spec §4.2
    /// `remove(n)`), shifting later entries forward. Design-available hook
    /// — the planner only ever retires from the head via
    /// [`Self::pop_done`].
    pub fn remove(&mut self, n: usize) -> Option<TrajectoryCycle> {
        self.entries.remove(n)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrajectoryCycle> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Line;
    use crate::tc::TermCond;

    fn tc(id: u32, target: f64) -> TrajectoryCycle {
        let line = Line::new([0.0, 0.0, 0.0], [target, 0.0, 0.0]);
        let abc = Line::new([0.0; 3], [0.0; 3]);
        let uvw = Line::new([0.0; 3], [0.0; 3]);
        TrajectoryCycle::new_linear(id, 1.0 / 1000.0, line, abc, uvw, 1.0, 10.0, 10.0, TermCond::Stop)
    }

    #[test]
    fn full_trips_before_hard_capacity() {
        let mut q = TcQueue::new(20);
        for i in 0..9 {
            assert!(!q.full());
            q.push(tc(i, 1.0));
        }
        assert!(q.full());
    }

    #[test]
    fn push_rejected_at_hard_capacity() {
        let mut q = TcQueue::new(2);
        assert!(q.push(tc(1, 1.0)));
        assert!(q.push(tc(2, 1.0)));
        assert!(!q.push(tc(3, 1.0)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn pop_done_only_removes_completed_head() {
        let mut q = TcQueue::new(10);
        q.push(tc(1, 1.0));
        assert!(q.pop_done().is_none());
        q.current_mut().unwrap().force_cycle(1.0);
        let done = q.pop_done().unwrap();
        assert_eq!(done.id, 1);
        assert!(q.is_empty());
    }

    #[test]
    fn next_looks_past_current() {
        let mut q = TcQueue::new(10);
        q.push(tc(1, 1.0));
        q.push(tc(2, 1.0));
        assert_eq!(q.current().unwrap().id, 1);
        assert_eq!(q.next().unwrap().id, 2);
    }

    #[test]
    fn clear_empties_queue() {
        let mut q = TcQueue::new(10);
        q.push(tc(1, 1.0));
        q.push(tc(2, 1.0));
        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn item_reads_any_offset_without_removing() {
        let mut q = TcQueue::new(10);
        q.push(tc(1, 1.0));
        q.push(tc(2, 1.0));
        q.push(tc(3, 1.0));
        assert_eq!(q.item(0).unwrap().id, 1);
        assert_eq!(q.item(2).unwrap().id, 3);
        assert!(q.item(3).is_none());
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn last_returns_most_recently_queued() {
        let mut q = TcQueue::new(10);
        assert!(q.last().is_none());
        q.push(tc(1, 1.0));
        assert_eq!(q.last().unwrap().id, 1);
        q.push(tc(2, 1.0));
        assert_eq!(q.last().unwrap().id, 2);
    }

    #[test]
    fn remove_drops_an_arbitrary_offset_and_shifts_the_rest() {
        let mut q = TcQueue::new(10);
        q.push(tc(1, 1.0));
        q.push(tc(2, 1.0));
        q.push(tc(3, 1.0));
        let removed = q.remove(1).unwrap();
        assert_eq!(removed.id, 2);
        assert_eq!(q.len(), 2);
        assert_eq!(q.current().unwrap().id, 1);
        assert_eq!(q.next().unwrap().id, 3);
    }
}
