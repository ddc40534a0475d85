//! Async Request Buffer
//!
//! A key-ordered admission buffer for small asynchronous operations. Work is
//! batched for throughput while requests sharing a key are never handed to the
//! downstream executor out of order.
//!
//! # Design
//!
//! - **Active queue**: FIFO of requests whose key has nothing in flight.
//! - **Blocking map**: per-key lists, sorted by descending priority, of
//!   requests waiting for their key's in-flight work to finish.
//! - **Batch timer**: a generation-numbered deadline per buffer, polled by one
//!   shared background ticker instead of a timer per batch.
//!
//! # Threading
//!
//! A buffer belongs to one owner thread; mutating operations take `&mut self`.
//! The shared ticker only reads the batch timer and invokes the timeout
//! handler. Closing a buffer is the one operation that coordinates with it.

pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod telemetry;

pub use buffer::{
    AsyncRequest, AsyncRequestBuffer, BufferCloser, BufferConfig, BufferStats, Priority,
    RequestBatch, RequestContainer, TimeoutHandler, TimeoutTicker,
};
pub use controller::{AsyncExecutionController, Batch, ControllerConfig};
pub use error::{BufferError, ConfigError, TickerError};
