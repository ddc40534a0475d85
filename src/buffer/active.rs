//! FIFO of requests ready for dispatch.

use std::collections::VecDeque;

use super::container::RequestContainer;

/// Requests ready to run, in admission order. Never reordered.
#[derive(Debug)]
pub struct ActiveQueue<R> {
    items: VecDeque<R>,
}

impl<R> ActiveQueue<R> {
    pub fn new() -> Self {
        Self { items: VecDeque::new() }
    }

    pub fn push(&mut self, request: R) {
        self.items.push_back(request);
    }

    /// Move up to `n` head items into a fresh container from `factory`.
    ///
    /// Returns `None` without calling `factory` when nothing would be moved.
    pub fn pop_into<C, F>(&mut self, n: usize, factory: F) -> Option<C>
    where
        C: RequestContainer<R>,
        F: FnOnce() -> C,
    {
        let count = n.min(self.items.len());
        if count == 0 {
            return None;
        }
        let mut container = factory();
        for request in self.items.drain(..count) {
            container.offer(request);
        }
        Some(container)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<R> Default for ActiveQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}
