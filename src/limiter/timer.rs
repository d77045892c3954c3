//! Deadline-ordered timer queue with cancellation tokens.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Identifies one scheduled timer. Tokens are never reused, so a record
/// holding a token can tell whether a popped timer is still its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// A timer that reached its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired<K> {
    pub key: K,
    pub token: TimerToken,
    pub deadline_ms: u64,
}

#[derive(Debug)]
struct Entry<K> {
    deadline_ms: u64,
    seq: u64,
    key: K,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_ms == other.deadline_ms && self.seq == other.seq
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest deadline first, then scheduling order
        other
            .deadline_ms
            .cmp(&self.deadline_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Timers keyed by `K`, popped in deadline order.
///
/// Cancelled timers are not removed from the heap; the owner drops its
/// token instead and ignores expirations it no longer holds.
#[derive(Debug)]
pub struct TimerQueue<K> {
    heap: BinaryHeap<Entry<K>>,
    next_seq: u64,
}

impl<K> TimerQueue<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `key` to expire at `deadline_ms`.
    pub fn schedule(&mut self, key: K, deadline_ms: u64) -> TimerToken {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline_ms,
            seq,
            key,
        });
        TimerToken(seq)
    }

    /// Earliest scheduled deadline, including cancelled timers.
    pub fn next_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.deadline_ms)
    }

    /// Earliest timer without removing it.
    pub fn peek(&self) -> Option<(&K, TimerToken, u64)> {
        self.heap
            .peek()
            .map(|e| (&e.key, TimerToken(e.seq), e.deadline_ms))
    }

    /// Pop the earliest timer if it is due at `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Expired<K>> {
        if self.heap.peek()?.deadline_ms > now_ms {
            return None;
        }
        self.heap.pop().map(|e| Expired {
            key: e.key,
            token: TimerToken(e.seq),
            deadline_ms: e.deadline_ms,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_then_schedule_order() {
        let mut timers = TimerQueue::new();
        timers.schedule("late", 300);
        timers.schedule("a", 100);
        timers.schedule("b", 100);

        assert_eq!(timers.next_deadline(), Some(100));
        assert!(timers.pop_due(99).is_none());

        let keys: Vec<_> = std::iter::from_fn(|| timers.pop_due(1000))
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "late"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn tokens_are_unique() {
        let mut timers = TimerQueue::new();
        let t1 = timers.schedule(1, 10);
        let t2 = timers.schedule(1, 10);
        assert_ne!(t1, t2);

        let first = timers.pop_due(10).unwrap();
        assert_eq!(first.token, t1);
    }
}
