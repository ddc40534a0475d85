//! Key-partitioned waiting area for requests whose key is busy.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use super::priority_list::PriorityList;
use super::request::AsyncRequest;

/// Map of key to its [`PriorityList`], plus a running total of blocked items.
///
/// A key is present only while its list is non-empty.
#[derive(Debug)]
pub struct BlockingMap<K, P> {
    lists: HashMap<K, PriorityList<AsyncRequest<K, P>>>,
    size: usize,
}

impl<K: Hash + Eq + Clone, P> BlockingMap<K, P> {
    pub fn new() -> Self {
        Self { lists: HashMap::new(), size: 0 }
    }

    /// Park a request behind the other requests of its key.
    pub fn enqueue(&mut self, request: AsyncRequest<K, P>) {
        self.lists
            .entry(request.key().clone())
            .or_default()
            .insert(request);
        self.size += 1;
    }

    /// Take the head of `key`'s list, dropping the entry once it empties.
    pub fn unblock_one<Q>(&mut self, key: &Q) -> Option<AsyncRequest<K, P>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let list = self.lists.get_mut(key)?;
        let request = list.pop_front();
        if list.is_empty() {
            self.lists.remove(key);
        }
        if request.is_some() {
            self.size -= 1;
        }
        request
    }

    /// Number of requests waiting for `key`.
    pub fn len_for<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lists.get(key).map_or(0, PriorityList::len)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lists.contains_key(key)
    }
}

impl<K, P> BlockingMap<K, P> {
    /// Total blocked requests across all keys.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of keys with at least one blocked request.
    pub fn key_count(&self) -> usize {
        self.lists.len()
    }
}

impl<K: Hash + Eq + Clone, P> Default for BlockingMap<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_track_enqueue_and_unblock() {
        let mut map: BlockingMap<&str, u32> = BlockingMap::new();
        map.enqueue(AsyncRequest::new("a", 1, 0));
        map.enqueue(AsyncRequest::new("a", 2, 1));
        map.enqueue(AsyncRequest::new("b", 0, 2));
        assert_eq!(map.len(), 3);
        assert_eq!(map.key_count(), 2);
        assert_eq!(map.len_for("a"), 2);

        let head = map.unblock_one("a").map(|r| *r.payload());
        assert_eq!(head, Some(1));
        assert_eq!(map.len(), 2);
        assert_eq!(map.key_count(), 2);

        map.unblock_one("b");
        assert_eq!(map.key_count(), 1);
        assert!(!map.contains_key("b"));
    }

    #[test]
    fn test_unblock_unknown_key_is_none() {
        let mut map: BlockingMap<String, ()> = BlockingMap::new();
        assert!(map.unblock_one("missing").is_none());
        assert!(map.is_empty());
        assert_eq!(map.key_count(), 0);
    }

    #[test]
    fn test_entry_removed_when_list_empties() {
        let mut map: BlockingMap<u64, ()> = BlockingMap::new();
        map.enqueue(AsyncRequest::unordered(7, ()));
        assert!(map.unblock_one(&7).is_some());
        assert!(!map.contains_key(&7));
        assert!(map.unblock_one(&7).is_none());
        assert_eq!(map.len(), 0);
    }

    fn totals<K, P>(map: &BlockingMap<K, P>) -> (usize, usize, bool) {
        (map.len(), map.key_count(), map.is_empty())
    }

    #[test]
    fn test_totals_need_no_key_bounds() {
        let mut map: BlockingMap<&str, ()> = BlockingMap::new();
        assert_eq!(totals(&map), (0, 0, true));
        map.enqueue(AsyncRequest::new("a", 0, ()));
        map.enqueue(AsyncRequest::new("b", 0, ()));
        assert_eq!(totals(&map), (2, 2, false));
    }
}
