//! Request type held by the buffer.

use std::fmt;

/// Priority of a buffered request. Higher values are more urgent.
///
/// [`Priority::MIN`] is a sentinel meaning "no ordering preference": such
/// requests always go to the tail of their key's waiting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Sentinel: appended at the tail, never reordered.
    pub const MIN: Priority = Priority(i32::MIN);
    pub const DEFAULT: Priority = Priority(0);

    pub fn is_min(self) -> bool {
        self == Self::MIN
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_min() {
            write!(f, "min")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A unit of pending work tagged with its ordering key and priority.
///
/// The buffer never inspects `payload`; it is handed back untouched when the
/// request leaves the buffer.
pub struct AsyncRequest<K, P> {
    key: K,
    priority: Priority,
    payload: P,
}

impl<K, P> AsyncRequest<K, P> {
    pub fn new(key: K, priority: impl Into<Priority>, payload: P) -> Self {
        Self { key, priority: priority.into(), payload }
    }

    /// Create a request without ordering preference.
    pub fn unordered(key: K, payload: P) -> Self {
        Self::new(key, Priority::MIN, payload)
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    /// Split the request into its key and payload.
    pub fn into_parts(self) -> (K, P) {
        (self.key, self.payload)
    }
}

impl<K: fmt::Debug, P> fmt::Debug for AsyncRequest<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRequest")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .finish()
    }
}
