//! Per-key waiting list ordered by descending priority.

use std::collections::VecDeque;

use super::request::{AsyncRequest, Priority};

/// Anything that carries a [`Priority`].
pub trait Prioritized {
    fn priority(&self) -> Priority;
}

impl<K, P> Prioritized for AsyncRequest<K, P> {
    fn priority(&self) -> Priority {
        AsyncRequest::priority(self)
    }
}

/// Requests waiting on one key, sorted by descending priority.
///
/// Equal priorities keep insertion order. [`Priority::MIN`] items are always
/// appended at the tail without scanning.
#[derive(Debug)]
pub struct PriorityList<T> {
    items: VecDeque<T>,
}

impl<T: Prioritized> PriorityList<T> {
    pub fn new() -> Self {
        Self { items: VecDeque::new() }
    }

    /// Insert `item` before the first element with strictly lower priority.
    pub fn insert(&mut self, item: T) {
        if self.items.is_empty() || item.priority().is_min() {
            self.items.push_back(item);
            return;
        }

        let priority = item.priority();
        let insert_pos = self
            .items
            .iter()
            .position(|existing| existing.priority() < priority)
            .unwrap_or(self.items.len());
        self.items.insert(insert_pos, item);
    }

    /// Remove the highest-priority (oldest among ties) item.
    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Prioritized> Default for PriorityList<T> {
    fn default() -> Self {
        Self::new()
    }
}
