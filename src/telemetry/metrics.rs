//! Metric recorders for buffer activity.

use ::metrics::{counter, gauge, histogram};

/// Publish the current queue depths of a buffer.
pub fn record_queue_depths(active: usize, blocking: usize, blocking_keys: usize) {
    gauge!("arb_active_queue_depth").set(active as f64);
    gauge!("arb_blocking_queue_depth").set(blocking as f64);
    gauge!("arb_blocking_keys").set(blocking_keys as f64);
}

/// Count a flushed batch and record its size.
pub fn record_batch_flushed(size: usize, by_timeout: bool) {
    let trigger = if by_timeout { "timeout" } else { "size" };
    counter!("arb_batches_flushed_total", "trigger" => trigger).increment(1);
    histogram!("arb_batch_size").record(size as f64);
}

pub fn record_timeout_fired() {
    counter!("arb_timeouts_fired_total").increment(1);
}

pub fn record_timeout_handler_panic() {
    counter!("arb_timeout_handler_panics_total").increment(1);
}
