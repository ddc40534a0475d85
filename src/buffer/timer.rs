//! Generation-numbered batch deadline tracking.
//!
//! The owner thread arms and advances the timer; the shared ticker thread only
//! polls it. The armed `(generation, deadline)` pair is published as a single
//! immutable snapshot so the ticker never observes a torn pair.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;

/// Deadline of the batch window opened at `generation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub generation: u64,
    pub deadline: Instant,
}

/// Debounced batch timer shared between a buffer and the timeout ticker.
#[derive(Debug)]
pub struct DebouncedTimer {
    timeout: Duration,
    current: AtomicU64,
    armed: ArcSwapOption<TimerSnapshot>,
    /// `generation + 1` of the last window reported as expired, 0 if none.
    last_fired: AtomicU64,
}

impl DebouncedTimer {
    /// A zero `timeout` disables the timer entirely.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            current: AtomicU64::new(0),
            armed: ArcSwapOption::empty(),
            last_fired: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arm for the current generation unless a window is already open.
    ///
    /// Returns `true` if this call armed the timer.
    pub fn arm_if_idle(&self, now: Instant) -> bool {
        if !self.is_enabled() || self.armed.load().is_some() {
            return false;
        }
        let snapshot = TimerSnapshot {
            generation: self.current.load(Ordering::Acquire),
            deadline: now + self.timeout,
        };
        self.armed.store(Some(Arc::new(snapshot)));
        true
    }

    /// Close the current window and start a new generation.
    ///
    /// Returns the new generation.
    pub fn advance(&self) -> u64 {
        self.armed.store(None);
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    pub fn snapshot(&self) -> Option<TimerSnapshot> {
        self.armed.load().as_deref().copied()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load().is_some()
    }

    /// Ticker-side check. Yields the generation of an expired, still-current
    /// window, at most once per window.
    pub fn poll_expired(&self, now: Instant) -> Option<u64> {
        let snapshot = self.armed.load_full()?;
        if snapshot.generation != self.current.load(Ordering::Acquire) || snapshot.deadline > now {
            return None;
        }
        let marker = snapshot.generation + 1;
        if self.last_fired.fetch_max(marker, Ordering::AcqRel) >= marker {
            return None;
        }
        Some(snapshot.generation)
    }
}
