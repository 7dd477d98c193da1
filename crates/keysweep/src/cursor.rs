use crate::keyspace::Assignment;
use portable_atomic::{AtomicU64, Ordering};

/// Result of [`Cursor::dispense`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispensed {
    /// The next undispensed index. Owned by the caller from now on.
    Index(u64),
    /// Every index of the assignment has been handed out.
    Exhausted,
}

/// The shared next-index counter of one worker.
///
/// A cursor walks `[offset, offset + range)` and hands out every index exactly
/// once across all of its callers. Dispensing is the only mutation. The state
/// is a single [`AtomicU64`] advanced with compare-and-swap, so it stays
/// correct whether the worker's lanes are interleaved on one thread or run in
/// parallel, and it never moves past the end of the range no matter how many
/// times it is polled after exhaustion.
pub struct Cursor {
    next: AtomicU64,
    start: u64,
    end: u64,
}

impl Cursor {
    pub const fn new(assignment: &Assignment) -> Self {
        Self {
            next: AtomicU64::new(assignment.offset),
            start: assignment.offset,
            end: assignment.end(),
        }
    }

    /// Takes the next index, or reports exhaustion.
    pub fn dispense(&self) -> Dispensed {
        match self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < self.end).then(|| next + 1)
            }) {
            Ok(index) => Dispensed::Index(index),
            Err(_) => Dispensed::Exhausted,
        }
    }

    /// Number of indices handed out so far.
    pub fn dispensed(&self) -> u64 {
        self.next.load(Ordering::Acquire) - self.start
    }

    /// Number of indices left to dispense.
    pub fn remaining(&self) -> u64 {
        self.end - self.next.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WorkerId;
    use std::collections::HashSet;

    fn assignment(offset: u64, range: u64) -> Assignment {
        Assignment {
            worker: WorkerId::new(1),
            offset,
            range,
        }
    }

    #[test]
    fn dispenses_the_range_in_order_then_exhausts() {
        let cursor = Cursor::new(&assignment(66, 34));
        for expected in 66..100 {
            assert_eq!(cursor.dispense(), Dispensed::Index(expected));
        }
        assert_eq!(cursor.remaining(), 0);
        for _ in 0..10 {
            assert_eq!(cursor.dispense(), Dispensed::Exhausted);
        }
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn remaining_counts_down() {
        let cursor = Cursor::new(&assignment(40, 3));
        assert_eq!(cursor.remaining(), 3);
        assert_eq!(cursor.dispensed(), 0);
        cursor.dispense();
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.dispensed(), 1);
    }

    #[test]
    fn parallel_callers_see_every_index_exactly_once() {
        const THREADS: usize = 8;
        const RANGE: u64 = 50_000;

        let cursor = Cursor::new(&assignment(1_000, RANGE));
        let mut per_thread: Vec<Vec<u64>> = Vec::new();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        let mut taken = Vec::new();
                        while let Dispensed::Index(i) = cursor.dispense() {
                            taken.push(i);
                        }
                        taken
                    })
                })
                .collect();
            per_thread = handles.into_iter().map(|h| h.join().unwrap()).collect();
        });

        let mut seen = HashSet::with_capacity(RANGE as usize);
        for i in per_thread.into_iter().flatten() {
            assert!((1_000..1_000 + RANGE).contains(&i));
            assert!(seen.insert(i), "index {i} dispensed twice");
        }
        assert_eq!(seen.len() as u64, RANGE);
    }

    #[test]
    fn cursor_at_the_top_of_u64_does_not_overflow() {
        let cursor = Cursor::new(&assignment(u64::MAX - 2, 2));
        assert_eq!(cursor.dispense(), Dispensed::Index(u64::MAX - 2));
        assert_eq!(cursor.dispense(), Dispensed::Index(u64::MAX - 1));
        assert_eq!(cursor.dispense(), Dispensed::Exhausted);
    }
}
