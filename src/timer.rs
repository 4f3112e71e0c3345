//! Deferred-callback queue.  The only concurrency primitive the engine needs.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

/// Handle returned by [`TimerQueue::arm`], used to cancel a pending timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

struct Entry<T> {
    deadline: Duration,
    id: TimerId,
    payload: T,
}

// Ordered by (deadline, id).  Ids grow with every arm, so equal deadlines fire
// in the order they were armed.
impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl<T> Eq for Entry<T> {}
impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.id).cmp(&(other.deadline, other.id))
    }
}

/// Min-heap of timers keyed by absolute deadline.
///
/// Cancellation is lazy: a cancelled entry stays in the heap but is dropped
/// when it reaches the top, so it can never fire.
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    live: HashSet<TimerId>,
    next_id: u64,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new(), live: HashSet::new(), next_id: 0 }
    }

    pub fn arm(&mut self, deadline: Duration, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.live.insert(id);
        self.heap.push(Reverse(Entry { deadline, id, payload }));
        id
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.live.remove(&id)
    }

    /// Number of armed, uncancelled timers.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse(e)| e.deadline)
    }

    /// Remove and return the earliest timer whose deadline is `<= now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, T)> {
        self.discard_cancelled();
        match self.heap.peek() {
            Some(Reverse(e)) if e.deadline <= now => {}
            _ => return None,
        }
        let Reverse(entry) = self.heap.pop()?;
        self.live.remove(&entry.id);
        Some((entry.deadline, entry.payload))
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse(e)) = self.heap.peek() {
            if self.live.contains(&e.id) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_pops_in_deadline_then_arm_order() {
        let mut q = TimerQueue::new();
        q.arm(ms(20), "late");
        q.arm(ms(10), "first");
        q.arm(ms(10), "second");
        assert_eq!(q.pop_due(ms(100)), Some((ms(10), "first")));
        assert_eq!(q.pop_due(ms(100)), Some((ms(10), "second")));
        assert_eq!(q.pop_due(ms(100)), Some((ms(20), "late")));
        assert_eq!(q.pop_due(ms(100)), None);
    }

    #[test]
    fn test_not_due_yet() {
        let mut q = TimerQueue::new();
        q.arm(ms(50), 1);
        assert_eq!(q.pop_due(ms(49)), None);
        assert_eq!(q.next_deadline(), Some(ms(50)));
        assert_eq!(q.pop_due(ms(50)), Some((ms(50), 1)));
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut q = TimerQueue::new();
        let a = q.arm(ms(10), 'a');
        q.arm(ms(20), 'b');
        assert!(q.cancel(a));
        assert!(!q.cancel(a));
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_deadline(), Some(ms(20)));
        assert_eq!(q.pop_due(ms(100)), Some((ms(20), 'b')));
        assert!(q.is_empty());
    }
}
