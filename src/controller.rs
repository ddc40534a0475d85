//! Execution controller driving an [`AsyncRequestBuffer`].
//!
//! Tracks which keys have a request in flight, routes new requests to the
//! active queue or the blocking map accordingly, and flushes batches on a
//! size threshold or a batch timeout. Timeout signals arrive from the ticker
//! thread over a channel and are acted on by the owner.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::buffer::{
    AsyncRequest, AsyncRequestBuffer, BufferConfig, Priority, RequestBatch, TimeoutHandler,
    TimeoutTicker,
};
use crate::error::BufferError;
use crate::telemetry;

/// A batch of requests ready for the downstream executor.
pub type Batch<K, P> = RequestBatch<AsyncRequest<K, P>>;

/// Configuration for the execution controller.
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub buffer: BufferConfig,
    /// Active queue size that triggers a flush.
    pub batch_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { buffer: BufferConfig::default(), batch_size: 1000 }
    }
}

/// Owner of a request buffer and of the in-flight key set.
///
/// At most one request per key is outside the blocking map at any time: a
/// key stays occupied from admission until [`complete`](Self::complete) finds
/// no further waiter for it.
pub struct AsyncExecutionController<K, P> {
    buffer: AsyncRequestBuffer<K, P>,
    in_flight: HashSet<K>,
    batch_size: usize,
    timeouts: mpsc::UnboundedReceiver<u64>,
}

impl<K: Hash + Eq + Clone, P> AsyncExecutionController<K, P> {
    /// Create a controller. Uses the process-wide ticker when `ticker` is `None`.
    pub fn new(config: ControllerConfig, ticker: Option<&TimeoutTicker>) -> Result<Self, BufferError> {
        if config.batch_size == 0 {
            return Err(BufferError::InvalidConfig("batch_size must be at least 1".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handler: TimeoutHandler = Arc::new(move |generation: u64| {
            // Receiver gone means the controller was dropped; nothing to do.
            let _ = tx.send(generation);
        });

        let buffer = match ticker {
            Some(ticker) => AsyncRequestBuffer::with_ticker(config.buffer, ticker, handler)?,
            None => AsyncRequestBuffer::new(config.buffer, handler)?,
        };

        Ok(Self {
            buffer,
            in_flight: HashSet::new(),
            batch_size: config.batch_size,
            timeouts: rx,
        })
    }

    /// Admit a request. Returns a batch if admission filled one.
    pub fn submit(
        &mut self,
        key: K,
        priority: impl Into<Priority>,
        payload: P,
    ) -> Option<Batch<K, P>> {
        let request = AsyncRequest::new(key, priority, payload);
        if self.in_flight.contains(request.key()) {
            self.buffer.enqueue_to_blocking(request);
            self.publish_depths();
            return None;
        }

        self.in_flight.insert(request.key().clone());
        self.buffer.enqueue_to_active(request);
        self.flush_if_full()
    }

    /// Mark the in-flight request of `key` as done.
    ///
    /// Promotes the next waiter of `key` into the active queue, or releases
    /// the key when nobody waits. Returns a batch if the promotion filled one.
    pub fn complete(&mut self, key: &K) -> Option<Batch<K, P>> {
        match self.buffer.unblock_one_by_key(key) {
            Some(next) => {
                trace!(priority = %next.priority(), "promoted blocked request");
                self.buffer.enqueue_to_active(next);
                self.flush_if_full()
            }
            None => {
                self.in_flight.remove(key);
                None
            }
        }
    }

    /// Wait for the next timeout signal from the ticker.
    ///
    /// Returns `None` once the buffer's registration is gone.
    pub async fn wait_timeout(&mut self) -> Option<u64> {
        self.timeouts.recv().await
    }

    /// Act on a timeout signal for `generation`. Stale signals are ignored.
    pub fn on_timeout(&mut self, generation: u64) -> Option<Batch<K, P>> {
        if !self.buffer.check_current_seq(generation) {
            trace!(generation, "stale timeout ignored");
            return None;
        }
        self.flush_inner(true)
    }

    /// Handle every timeout signal received so far.
    pub fn process_timeouts(&mut self) -> Vec<Batch<K, P>> {
        let mut batches = Vec::new();
        while let Ok(generation) = self.timeouts.try_recv() {
            if let Some(batch) = self.on_timeout(generation) {
                batches.push(batch);
            }
        }
        batches
    }

    /// Pop up to `batch_size` active requests and start a new window.
    pub fn flush(&mut self) -> Option<Batch<K, P>> {
        self.flush_inner(false)
    }

    fn flush_if_full(&mut self) -> Option<Batch<K, P>> {
        if self.buffer.active_queue_size() >= self.batch_size {
            return self.flush_inner(false);
        }
        self.publish_depths();
        None
    }

    fn flush_inner(&mut self, by_timeout: bool) -> Option<Batch<K, P>> {
        let generation = self.buffer.current_generation();
        let batch_size = self.batch_size;
        let mut batch = self
            .buffer
            .pop_active(batch_size, || RequestBatch::with_capacity(batch_size))?;
        batch.generation = generation;
        self.buffer.advance_generation();

        telemetry::record_batch_flushed(batch.len(), by_timeout);
        self.publish_depths();
        debug!(generation, size = batch.len(), by_timeout, "batch flushed");
        Some(batch)
    }

    fn publish_depths(&self) {
        telemetry::record_queue_depths(
            self.buffer.active_queue_size(),
            self.buffer.blocking_queue_size(),
            self.buffer.blocking_key_num(),
        );
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.contains(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn buffer(&self) -> &AsyncRequestBuffer<K, P> {
        &self.buffer
    }

    /// Stop timeout checks. Idempotent.
    pub fn close(&self) -> Result<(), BufferError> {
        self.buffer.close()
    }
}
