//! A FIFO worklist for fixpoint iterations over dense indices.

use std::collections::VecDeque;
use std::fmt;

use bitset::BitSet;

#[cfg(test)]
mod tests;

/// Every element is queued at most once at a time: inserting an element that is still waiting
/// to be popped does nothing.
pub struct WorkQueue<T> {
    queue: VecDeque<T>,
    queued: BitSet<T>,
}

impl<T: From<usize> + Into<usize> + Copy> WorkQueue<T> {
    /// An empty queue for the elements `0..domain_size`.
    pub fn with_none(domain_size: usize) -> Self {
        WorkQueue { queue: VecDeque::new(), queued: BitSet::new_empty(domain_size) }
    }

    /// A queue that holds `0..domain_size` in ascending order.
    pub fn with_all(domain_size: usize) -> Self {
        WorkQueue {
            queue: (0..domain_size).map(T::from).collect(),
            queued: BitSet::new_filled(domain_size),
        }
    }

    /// Returns whether `elem` was queued.
    pub fn insert(&mut self, elem: T) -> bool {
        let fresh = self.queued.insert(elem);
        if fresh {
            self.queue.push_back(elem);
        }
        fresh
    }

    pub fn pop(&mut self) -> Option<T> {
        let elem = self.queue.pop_front()?;
        self.queued.remove(elem);
        Some(elem)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<T: From<usize> + Into<usize> + Copy> Extend<T> for WorkQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for elem in iter {
            self.insert(elem);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.queue).finish()
    }
}
