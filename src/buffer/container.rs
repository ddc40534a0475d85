//! Batch containers that popped requests are moved into.

/// Sink accepting requests popped from the active queue.
pub trait RequestContainer<R> {
    /// Accept one request.
    fn offer(&mut self, request: R);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> RequestContainer<R> for Vec<R> {
    fn offer(&mut self, request: R) {
        self.push(request);
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// A batch of requests handed to the downstream executor.
#[derive(Debug)]
pub struct RequestBatch<R> {
    pub requests: Vec<R>,
    /// Generation of the buffer window this batch was flushed from.
    pub generation: u64,
}

impl<R> RequestBatch<R> {
    pub fn new() -> Self {
        Self { requests: Vec::new(), generation: 0 }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { requests: Vec::with_capacity(capacity), generation: 0 }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.requests.iter()
    }
}

impl<R> Default for RequestBatch<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RequestContainer<R> for RequestBatch<R> {
    fn offer(&mut self, request: R) {
        self.requests.push(request);
    }

    fn len(&self) -> usize {
        self.requests.len()
    }
}

impl<R> IntoIterator for RequestBatch<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.into_iter()
    }
}
