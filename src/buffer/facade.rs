//! The request buffer: active queue, blocking map and batch timer.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::active::ActiveQueue;
use super::blocking::BlockingMap;
use super::container::RequestContainer;
use super::request::AsyncRequest;
use super::ticker::{TickerRegistration, TimeoutHandler, TimeoutTicker};
use super::timer::{DebouncedTimer, TimerSnapshot};
use crate::error::BufferError;

/// Timeout settings of a buffer. Immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    /// Age of the oldest undispatched item that triggers a timeout flush.
    /// Zero disables timeouts.
    pub buffer_timeout: Duration,
    /// Period of the shared ticker's check for this buffer.
    pub check_interval: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_timeout: Duration::from_millis(1000),
            check_interval: Duration::from_millis(100),
        }
    }
}

impl BufferConfig {
    /// Config with timeout-triggered flushing turned off.
    pub fn disabled() -> Self {
        Self { buffer_timeout: Duration::ZERO, ..Default::default() }
    }

    pub fn timeout_enabled(&self) -> bool {
        !self.buffer_timeout.is_zero()
    }

    pub fn validate(&self) -> Result<(), BufferError> {
        if self.timeout_enabled() && self.check_interval.is_zero() {
            return Err(BufferError::InvalidConfig(
                "check_interval must be non-zero when buffer_timeout is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of a buffer's sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub active: usize,
    pub blocking: usize,
    pub blocking_keys: usize,
    pub generation: u64,
    pub timer_armed: bool,
}

/// Holds requests until they are batched, keeping per-key order.
///
/// All mutating operations take `&mut self` and belong to the single owner of
/// the buffer. The only work done elsewhere is the shared ticker polling the
/// batch timer, and [`close`](Self::close) / [`BufferCloser`] cancelling that.
pub struct AsyncRequestBuffer<K, P> {
    active: ActiveQueue<AsyncRequest<K, P>>,
    blocking: BlockingMap<K, P>,
    timer: Arc<DebouncedTimer>,
    config: BufferConfig,
    registration: Arc<Mutex<Option<TickerRegistration>>>,
}

impl<K: Hash + Eq + Clone, P> AsyncRequestBuffer<K, P> {
    /// Create a buffer polled by the process-wide ticker.
    pub fn new(config: BufferConfig, handler: TimeoutHandler) -> Result<Self, BufferError> {
        if !config.timeout_enabled() {
            return Self::build(config, None, handler);
        }
        let ticker = TimeoutTicker::global().map_err(BufferError::Register)?;
        Self::build(config, Some(ticker.as_ref()), handler)
    }

    /// Create a buffer polled by `ticker`.
    pub fn with_ticker(
        config: BufferConfig,
        ticker: &TimeoutTicker,
        handler: TimeoutHandler,
    ) -> Result<Self, BufferError> {
        Self::build(config, Some(ticker), handler)
    }

    /// Create a buffer with timeout flushing disabled.
    pub fn without_timeout() -> Self {
        Self {
            active: ActiveQueue::new(),
            blocking: BlockingMap::new(),
            timer: Arc::new(DebouncedTimer::new(Duration::ZERO)),
            config: BufferConfig::disabled(),
            registration: Arc::new(Mutex::new(None)),
        }
    }

    fn build(
        config: BufferConfig,
        ticker: Option<&TimeoutTicker>,
        handler: TimeoutHandler,
    ) -> Result<Self, BufferError> {
        config.validate()?;
        let timer = Arc::new(DebouncedTimer::new(config.buffer_timeout));

        let registration = match ticker {
            Some(ticker) if config.timeout_enabled() => Some(
                ticker
                    .register(timer.clone(), handler, config.buffer_timeout, config.check_interval)
                    .map_err(BufferError::Register)?,
            ),
            _ => None,
        };

        debug!(
            buffer_timeout_ms = config.buffer_timeout.as_millis() as u64,
            check_interval_ms = config.check_interval.as_millis() as u64,
            registered = registration.is_some(),
            "request buffer created"
        );
        Ok(Self {
            active: ActiveQueue::new(),
            blocking: BlockingMap::new(),
            timer,
            config,
            registration: Arc::new(Mutex::new(registration)),
        })
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Admit a request whose key has no work in flight.
    ///
    /// The first item of a fresh batch arms the batch timer; later items
    /// never push the deadline out.
    pub fn enqueue_to_active(&mut self, request: AsyncRequest<K, P>) {
        self.active.push(request);
        if self.timer.arm_if_idle(Instant::now()) {
            trace!(generation = self.timer.current_generation(), "batch timer armed");
        }
    }

    /// Park a request behind the in-flight work of its key.
    pub fn enqueue_to_blocking(&mut self, request: AsyncRequest<K, P>) {
        self.blocking.enqueue(request);
    }

    /// Release the next waiter of `key`, highest priority first.
    ///
    /// The request is handed back to the caller, not re-admitted.
    pub fn unblock_one_by_key<Q>(&mut self, key: &Q) -> Option<AsyncRequest<K, P>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.blocking.unblock_one(key)
    }

    /// Move up to `n` active requests, in order, into a container from `factory`.
    ///
    /// Returns `None` iff the active queue is empty or `n` is zero. Leaves the
    /// timer alone; call [`advance_generation`](Self::advance_generation) once
    /// the batch is committed.
    pub fn pop_active<C, F>(&mut self, n: usize, factory: F) -> Option<C>
    where
        C: RequestContainer<AsyncRequest<K, P>>,
        F: FnOnce() -> C,
    {
        self.active.pop_into(n, factory)
    }

    /// Close the current batch window, making pending timeout callbacks stale.
    pub fn advance_generation(&mut self) -> u64 {
        self.timer.advance()
    }

    /// Whether `generation` is still the current window.
    pub fn check_current_seq(&self, generation: u64) -> bool {
        self.timer.is_current(generation)
    }

    pub fn current_generation(&self) -> u64 {
        self.timer.current_generation()
    }

    pub fn timer_snapshot(&self) -> Option<TimerSnapshot> {
        self.timer.snapshot()
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn active_queue_size(&self) -> usize {
        self.active.len()
    }

    pub fn blocking_queue_size(&self) -> usize {
        self.blocking.len()
    }

    pub fn blocking_key_num(&self) -> usize {
        self.blocking.key_count()
    }

    /// Number of requests blocked behind `key`.
    pub fn blocking_len_for<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.blocking.len_for(key)
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            active: self.active_queue_size(),
            blocking: self.blocking_queue_size(),
            blocking_keys: self.blocking_key_num(),
            generation: self.current_generation(),
            timer_armed: self.timer_armed(),
        }
    }
}

impl<K, P> AsyncRequestBuffer<K, P> {
    /// Stop timeout checks for this buffer. Idempotent.
    ///
    /// Waits for a running timeout check of this buffer to finish; once this
    /// returns no handler call for this buffer will start. Must not be called
    /// from this buffer's own timeout handler.
    pub fn close(&self) -> Result<(), BufferError> {
        close_registration(&self.registration)
    }

    /// A handle that can close this buffer from another thread.
    pub fn closer(&self) -> BufferCloser {
        BufferCloser { registration: self.registration.clone() }
    }

    pub fn is_registered(&self) -> bool {
        self.registration.lock().is_some()
    }
}

impl<K, P> Drop for AsyncRequestBuffer<K, P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close request buffer on drop");
        }
    }
}

impl<K, P> std::fmt::Debug for AsyncRequestBuffer<K, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRequestBuffer")
            .field("active", &self.active.len())
            .field("blocking", &self.blocking.len())
            .field("generation", &self.timer.current_generation())
            .field("config", &self.config)
            .finish()
    }
}

/// Cloneable handle that closes a buffer's timeout registration.
#[derive(Clone)]
pub struct BufferCloser {
    registration: Arc<Mutex<Option<TickerRegistration>>>,
}

impl BufferCloser {
    pub fn close(&self) -> Result<(), BufferError> {
        close_registration(&self.registration)
    }
}

fn close_registration(slot: &Mutex<Option<TickerRegistration>>) -> Result<(), BufferError> {
    let mut slot = slot.lock();
    let Some(registration) = slot.take() else {
        return Ok(());
    };
    let id = registration.id();
    registration.cancel().map_err(BufferError::Close)?;
    debug!(registration = id, "request buffer closed");
    Ok(())
}
