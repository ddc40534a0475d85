//! Telemetry for the request buffer.
//!
//! Structured logging through `tracing` and counters/gauges through the
//! `metrics` facade. No exporter is installed here; the embedding process
//! chooses one.

mod logging;
mod metrics;

pub use self::logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_batch_flushed, record_queue_depths, record_timeout_fired,
    record_timeout_handler_panic,
};
