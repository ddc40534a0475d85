//! Shared periodic timeout ticker.
//!
//! One background thread polls the [`DebouncedTimer`] of every registered
//! buffer at each registration's own fixed rate. Buffers never own a timer
//! thread; they only expose their timer for polling.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};

use super::timer::DebouncedTimer;
use crate::error::TickerError;
use crate::telemetry;

/// Callback invoked on the ticker thread with the expired generation.
pub type TimeoutHandler = Arc<dyn Fn(u64) + Send + Sync>;

/// Thread name of the process-wide ticker.
pub const GLOBAL_TICKER_NAME: &str = "async-request-buffer-timeout";

static GLOBAL_TICKER: OnceLock<Arc<TimeoutTicker>> = OnceLock::new();

/// One registered timer.
struct Registration {
    id: u64,
    timer: Arc<DebouncedTimer>,
    handler: TimeoutHandler,
    /// Held for the whole poll-and-invoke; cancellation takes it too, so a
    /// cancel and a running check never overlap.
    cancelled: Mutex<bool>,
}

struct Schedule {
    next_due: Instant,
    period: Duration,
    registration: Arc<Registration>,
}

struct TickerState {
    shutdown: bool,
    entries: HashMap<u64, Schedule>,
}

struct TickerShared {
    state: Mutex<TickerState>,
    wakeup: Condvar,
    next_id: AtomicU64,
}

/// Periodic background task serving every buffer that enables timeouts.
pub struct TimeoutTicker {
    shared: Arc<TickerShared>,
    name: String,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutTicker {
    /// Spawn a new ticker thread named `name`.
    pub fn new(name: impl Into<String>) -> Result<Self, TickerError> {
        let name = name.into();
        let shared = Arc::new(TickerShared {
            state: Mutex::new(TickerState { shutdown: false, entries: HashMap::new() }),
            wakeup: Condvar::new(),
            next_id: AtomicU64::new(1),
        });

        let shared_clone = shared.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::run(shared_clone))
            .map_err(|e| TickerError::Spawn(e.to_string()))?;

        debug!(ticker = %name, "timeout ticker started");
        Ok(Self { shared, name, handle: Mutex::new(Some(handle)) })
    }

    /// The lazily created process-wide ticker.
    pub fn global() -> Result<Arc<TimeoutTicker>, TickerError> {
        if let Some(ticker) = GLOBAL_TICKER.get() {
            return Ok(ticker.clone());
        }
        let ticker = Arc::new(Self::new(GLOBAL_TICKER_NAME)?);
        // A losing racer's ticker is dropped here, which joins its idle thread.
        Ok(GLOBAL_TICKER.get_or_init(|| ticker).clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Poll `timer` every `period`, starting after `initial_delay`.
    pub fn register(
        &self,
        timer: Arc<DebouncedTimer>,
        handler: TimeoutHandler,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TickerRegistration, TickerError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration {
            id,
            timer,
            handler,
            cancelled: Mutex::new(false),
        });

        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Err(TickerError::Shutdown);
            }
            state.entries.insert(
                id,
                Schedule {
                    next_due: Instant::now() + initial_delay,
                    period,
                    registration: registration.clone(),
                },
            );
        }
        self.shared.wakeup.notify_one();

        trace!(ticker = %self.name, registration = id, ?period, "timeout check registered");
        Ok(TickerRegistration { id, registration, shared: Arc::downgrade(&self.shared) })
    }

    /// Number of live registrations.
    pub fn registration_count(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Stop the ticker thread and wait for it to exit.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
        }
        self.shared.wakeup.notify_all();

        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() {
                join_ticker_thread(&self.name, handle);
            }
        }
        debug!(ticker = %self.name, "timeout ticker stopped");
    }

    /// Ticker thread main loop.
    fn run(shared: Arc<TickerShared>) {
        loop {
            let due = {
                let mut state = shared.state.lock();
                loop {
                    if state.shutdown {
                        return;
                    }
                    let now = Instant::now();
                    match state.entries.values().map(|s| s.next_due).min() {
                        None => shared.wakeup.wait(&mut state),
                        Some(at) if at > now => {
                            shared.wakeup.wait_until(&mut state, at);
                        }
                        Some(_) => break,
                    }
                }
                Self::take_due(&mut state, Instant::now())
            };

            for registration in due {
                Self::check(&registration);
            }
        }
    }

    /// Collect due registrations and reschedule them at their fixed rate.
    fn take_due(state: &mut TickerState, now: Instant) -> Vec<Arc<Registration>> {
        let mut due = Vec::new();
        for schedule in state.entries.values_mut() {
            if schedule.next_due > now {
                continue;
            }
            schedule.next_due += schedule.period;
            // Missed periods are skipped rather than replayed in a burst.
            if schedule.next_due <= now {
                schedule.next_due = now + schedule.period;
            }
            due.push(schedule.registration.clone());
        }
        due
    }

    fn check(registration: &Registration) {
        let cancelled = registration.cancelled.lock();
        if *cancelled {
            return;
        }
        let Some(generation) = registration.timer.poll_expired(Instant::now()) else {
            return;
        };

        trace!(registration = registration.id, generation, "buffer timeout fired");
        telemetry::record_timeout_fired();
        let handler = &registration.handler;
        if panic::catch_unwind(AssertUnwindSafe(|| handler(generation))).is_err() {
            telemetry::record_timeout_handler_panic();
            error!(
                registration = registration.id,
                generation, "timeout handler panicked; ticker keeps serving other buffers"
            );
        }
        drop(cancelled);
    }
}

/// Join the ticker thread, logging if it died by panic. Returns `true` on a clean exit.
fn join_ticker_thread(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(ticker = %name, %reason, "timeout ticker thread panicked");
            false
        }
    }
}

impl Drop for TimeoutTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TimeoutTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutTicker")
            .field("name", &self.name)
            .field("registrations", &self.registration_count())
            .finish()
    }
}

/// A buffer's association with the ticker. Cancel it to stop timeout checks.
pub struct TickerRegistration {
    id: u64,
    registration: Arc<Registration>,
    shared: Weak<TickerShared>,
}

impl TickerRegistration {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop polling this registration.
    ///
    /// Blocks while a check for this registration is running, so once this
    /// returns the handler is neither running nor going to run again. Must not
    /// be called from inside this registration's own handler.
    pub fn cancel(self) -> Result<(), TickerError> {
        *self.registration.cancelled.lock() = true;

        let shared = self.shared.upgrade().ok_or(TickerError::Shutdown)?;
        let mut state = shared.state.lock();
        if state.shutdown {
            return Err(TickerError::Shutdown);
        }
        state
            .entries
            .remove(&self.id)
            .map(|_| ())
            .ok_or(TickerError::UnknownRegistration(self.id))
    }
}

impl std::fmt::Debug for TickerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickerRegistration").field("id", &self.id).finish()
    }
}
