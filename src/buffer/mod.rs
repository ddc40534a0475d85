//! Key-ordered request admission buffer.
//!
//! Requests whose key has no work in flight go to the active queue; the rest
//! wait in a per-key priority list until the owner unblocks them. Batches are
//! popped from the active queue when a size threshold is hit or the shared
//! ticker reports that the batch timer expired.

mod active;
mod blocking;
mod container;
mod facade;
mod priority_list;
mod request;
pub mod ticker;
mod timer;

pub use active::ActiveQueue;
pub use blocking::BlockingMap;
pub use container::{RequestBatch, RequestContainer};
pub use facade::{AsyncRequestBuffer, BufferCloser, BufferConfig, BufferStats};
pub use priority_list::{Prioritized, PriorityList};
pub use request::{AsyncRequest, Priority};
pub use ticker::{TickerRegistration, TimeoutHandler, TimeoutTicker};
pub use timer::{DebouncedTimer, TimerSnapshot};
