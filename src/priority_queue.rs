//! Fixed-capacity binary heap used by the HNSW graph search.
//!
//! A thin wrapper around a `Vec`-backed array heap, direction-parameterized
//! so the same type serves as both the min-ordered candidate frontier and
//! the max-ordered bounded result set during layer search. Capacity is
//! fixed at construction: pushing past it is a caller error rather than a
//! silent reallocation, matching the array-backed heap the graph is
//! originally specified in terms of.

use crate::error::{Error, Result};

/// Which end of the ordering `pop` removes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapDirection {
    /// `pop` returns the smallest distance (used for the candidate
    /// frontier during search).
    Min,
    /// `pop` returns the largest distance (used for the bounded result
    /// set, so the worst-kept result sits at the root for eviction).
    Max,
}

#[derive(Debug, Clone, Copy)]
struct Item {
    node_id: u32,
    distance: f32,
}

/// A fixed-capacity binary heap of `(node_id, distance)` pairs.
#[derive(Debug, Clone)]
pub struct PriorityQueue {
    items: Vec<Item>,
    capacity: usize,
    direction: HeapDirection,
}

impl PriorityQueue {
    /// Creates an empty queue with room for `capacity` items.
    #[must_use]
    pub fn new(capacity: usize, direction: HeapDirection) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            direction,
        }
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the queue is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// The configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Distance at the root, without removing it.
    #[must_use]
    pub fn peek_distance(&self) -> Option<f32> {
        self.items.first().map(|it| it.distance)
    }

    fn should_swap(&self, a: f32, b: f32) -> bool {
        match self.direction {
            HeapDirection::Min => a < b,
            HeapDirection::Max => a > b,
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.should_swap(self.items[idx].distance, self.items[parent].distance) {
                self.items.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut extreme = idx;

            if left < self.items.len()
                && self.should_swap(self.items[left].distance, self.items[extreme].distance)
            {
                extreme = left;
            }
            if right < self.items.len()
                && self.should_swap(self.items[right].distance, self.items[extreme].distance)
            {
                extreme = right;
            }

            if extreme == idx {
                break;
            }
            self.items.swap(idx, extreme);
            idx = extreme;
        }
    }

    /// Pushes `(node_id, distance)` onto the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the queue is already at
    /// capacity.
    pub fn push(&mut self, node_id: u32, distance: f32) -> Result<()> {
        if self.is_full() {
            return Err(Error::InvalidArgument(
                "priority queue is at capacity".to_string(),
            ));
        }
        self.items.push(Item { node_id, distance });
        self.sift_up(self.items.len() - 1);
        Ok(())
    }

    /// Removes and returns the root `(node_id, distance)` pair, or `None`
    /// if the queue is empty.
    pub fn pop(&mut self) -> Option<(u32, f32)> {
        if self.items.is_empty() {
            return None;
        }
        let root = self.items[0];
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some((root.node_id, root.distance))
    }

    /// Drains the queue in heap-pop order (not fully sorted if the heap
    /// invariant doesn't hold for non-root positions, but each successive
    /// pop is correct).
    pub fn drain_sorted(&mut self) -> Vec<(u32, f32)> {
        let mut out = Vec::with_capacity(self.items.len());
        while let Some(item) = self.pop() {
            out.push(item);
        }
        out
    }
}
