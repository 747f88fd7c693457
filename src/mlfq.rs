//! The MLFQ ready queues.
//!
//! A fixed-capacity ring buffer per level, extended with duplicate
//! suppression and indexed removal (for aging) on top of plain
//! push/pop: the aging sweep needs `contains`/`remove_at` by value, since
//! a process can leave its queue out of FIFO order when it's promoted.

use crate::param::{MAXQUEUE, NUMQUEUE};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MlfqError {
    Full,
}

/// A single priority level: a bounded FIFO of process-table indices.
#[derive(Copy, Clone)]
struct Level {
    inner: [Option<usize>; NUMQUEUE],
    start: usize,
    len: usize,
}
impl Level {
    const fn new() -> Level {
        Level {
            inner: [None; NUMQUEUE],
            start: 0,
            len: 0,
        }
    }
    fn is_empty(&self) -> bool {
        self.len == 0
    }
    fn is_full(&self) -> bool {
        self.len == self.inner.len()
    }
    fn slot(&self, offset: usize) -> usize {
        (self.start + offset) % self.inner.len()
    }
    fn contains(&self, index: usize) -> bool {
        (0..self.len).any(|i| self.inner[self.slot(i)] == Some(index))
    }
    /// Matches `proc.c`'s `pushback`: refuses to enqueue an index already
    /// present, so a process can never appear twice in the same level.
    fn push_back(&mut self, index: usize) -> Result<(), MlfqError> {
        if self.contains(index) {
            return Ok(());
        }
        if self.is_full() {
            return Err(MlfqError::Full);
        }
        let slot = self.slot(self.len);
        self.inner[slot] = Some(index);
        self.len += 1;
        Ok(())
    }
    fn pop_front(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let item = self.inner[self.start].take();
        self.start = (self.start + 1) % self.inner.len();
        self.len -= 1;
        item
    }
    /// Removes `index` from wherever it sits in the level, shifting the
    /// remaining entries left to close the gap, matching `proc.c`'s
    /// `deleteIdx`. Used by `ageproc` to promote a process out of a level
    /// it didn't reach the front of, and by `kill`/`exit` to drop a
    /// process out of a queue it's still sitting in.
    fn remove_at(&mut self, index: usize) -> bool {
        let Some(pos) = (0..self.len).find(|&i| self.inner[self.slot(i)] == Some(index)) else {
            return false;
        };
        for i in pos..self.len - 1 {
            self.inner[self.slot(i)] = self.inner[self.slot(i + 1)];
        }
        let last = self.slot(self.len - 1);
        self.inner[last] = None;
        self.len -= 1;
        true
    }
    fn len_(&self) -> usize {
        self.len
    }
}

/// All `MAXQUEUE` MLFQ levels, index 0 highest priority.
pub struct Mlfq {
    levels: [Level; MAXQUEUE],
}
impl Mlfq {
    pub const fn new() -> Mlfq {
        Mlfq {
            levels: [Level::new(); MAXQUEUE],
        }
    }

    pub fn push_back(&mut self, level: usize, index: usize) -> Result<(), MlfqError> {
        self.levels[level].push_back(index)
    }
    pub fn pop_front(&mut self, level: usize) -> Option<usize> {
        self.levels[level].pop_front()
    }
    pub fn contains(&self, level: usize, index: usize) -> bool {
        self.levels[level].contains(index)
    }
    pub fn remove_at(&mut self, level: usize, index: usize) -> bool {
        self.levels[level].remove_at(index)
    }
    pub fn len(&self, level: usize) -> usize {
        self.levels[level].len_()
    }
    pub fn is_empty(&self, level: usize) -> bool {
        self.levels[level].is_empty()
    }

    /// Removes `index` from whichever level currently holds it, if any.
    /// Used when a sleeping or killed process must leave the ready queues
    /// without the caller knowing its level.
    pub fn remove_anywhere(&mut self, index: usize) {
        for level in self.levels.iter_mut() {
            if level.remove_at(index) {
                return;
            }
        }
    }

    /// The highest non-empty level, if any process is ready.
    pub fn highest_nonempty(&self) -> Option<usize> {
        (0..MAXQUEUE).find(|&lvl| !self.is_empty(lvl))
    }
}
impl Default for Mlfq {
    fn default() -> Self {
        Mlfq::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_a_level() {
        let mut q = Mlfq::new();
        q.push_back(0, 3).unwrap();
        q.push_back(0, 1).unwrap();
        q.push_back(0, 2).unwrap();
        assert_eq!(q.pop_front(0), Some(3));
        assert_eq!(q.pop_front(0), Some(1));
        assert_eq!(q.pop_front(0), Some(2));
        assert_eq!(q.pop_front(0), None);
    }

    #[test]
    fn duplicate_push_is_ignored() {
        let mut q = Mlfq::new();
        q.push_back(1, 5).unwrap();
        q.push_back(1, 5).unwrap();
        assert_eq!(q.len(1), 1);
    }

    #[test]
    fn remove_at_closes_the_gap() {
        let mut q = Mlfq::new();
        q.push_back(2, 10).unwrap();
        q.push_back(2, 11).unwrap();
        q.push_back(2, 12).unwrap();
        assert!(q.remove_at(2, 11));
        assert_eq!(q.len(2), 2);
        assert_eq!(q.pop_front(2), Some(10));
        assert_eq!(q.pop_front(2), Some(12));
    }

    #[test]
    fn remove_anywhere_finds_the_right_level() {
        let mut q = Mlfq::new();
        q.push_back(3, 7).unwrap();
        q.remove_anywhere(7);
        assert!(q.is_empty(3));
    }

    #[test]
    fn highest_nonempty_prefers_lower_index() {
        let mut q = Mlfq::new();
        q.push_back(4, 1).unwrap();
        q.push_back(1, 2).unwrap();
        assert_eq!(q.highest_nonempty(), Some(1));
    }

    #[test]
    fn full_level_rejects_new_index() {
        let mut q = Mlfq::new();
        for i in 0..NUMQUEUE {
            q.push_back(0, i).unwrap();
        }
        assert_eq!(q.push_back(0, NUMQUEUE), Err(MlfqError::Full));
    }
}
