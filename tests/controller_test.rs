//! End-to-end tests for the execution controller.

use std::collections::HashMap;
use std::time::Duration;

use async_request_buffer::buffer::{BufferConfig, Priority, TimeoutTicker};
use async_request_buffer::{AsyncExecutionController, Batch, ControllerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_test::assert_ok;

fn sync_controller(batch_size: usize) -> AsyncExecutionController<u32, u32> {
    let config = ControllerConfig { buffer: BufferConfig::disabled(), batch_size };
    AsyncExecutionController::new(config, None).unwrap()
}

fn payloads(batch: &Batch<u32, u32>) -> Vec<u32> {
    batch.iter().map(|r| *r.payload()).collect()
}

#[test]
fn waiters_released_by_priority_after_completion() {
    let mut ctl = sync_controller(1);

    let first = ctl.submit(7, 0, 100).unwrap();
    assert_eq!(payloads(&first), vec![100]);

    assert!(ctl.submit(7, 1, 101).is_none());
    assert!(ctl.submit(7, Priority::MIN, 102).is_none());
    assert!(ctl.submit(7, 5, 103).is_none());
    assert_eq!(ctl.buffer().blocking_len_for(&7), 3);

    let mut order = Vec::new();
    loop {
        match ctl.complete(&7) {
            Some(batch) => order.extend(payloads(&batch)),
            None => break,
        }
    }
    assert_eq!(order, vec![103, 101, 102]);
    assert!(!ctl.is_in_flight(&7));
}

#[test]
fn one_request_per_key_outside_blocking_map() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut ctl = sync_controller(4);
    // Requests handed out but not yet completed, by key.
    let mut outstanding: HashMap<u32, u32> = HashMap::new();
    let mut submitted = 0u32;
    let mut released = 0u32;

    let mut take = |batch: Batch<u32, u32>, outstanding: &mut HashMap<u32, u32>| {
        for request in batch {
            let (key, _) = request.into_parts();
            let count = outstanding.entry(key).or_default();
            *count += 1;
            assert_eq!(*count, 1, "key {key} exposed twice at once");
            released += 1;
        }
    };

    for step in 0..400u32 {
        if rng.gen_bool(0.6) || outstanding.is_empty() {
            let key: u32 = rng.gen_range(0..6);
            submitted += 1;
            if let Some(batch) = ctl.submit(key, rng.gen_range(0i32..3), step) {
                take(batch, &mut outstanding);
            }
        } else {
            let key = *outstanding.keys().next().unwrap();
            outstanding.remove(&key);
            if let Some(batch) = ctl.complete(&key) {
                take(batch, &mut outstanding);
            }
        }
        if let Some(batch) = ctl.flush() {
            take(batch, &mut outstanding);
        }
    }

    // Drain everything left.
    while !outstanding.is_empty() {
        let key = *outstanding.keys().next().unwrap();
        outstanding.remove(&key);
        if let Some(batch) = ctl.complete(&key) {
            take(batch, &mut outstanding);
        }
        if let Some(batch) = ctl.flush() {
            take(batch, &mut outstanding);
        }
    }
    assert_eq!(released, submitted);
    assert_eq!(ctl.buffer().blocking_queue_size(), 0);
    assert_eq!(ctl.in_flight_count(), 0);
}

#[test]
fn flush_advances_generation() {
    let mut ctl = sync_controller(100);
    ctl.submit(1, 0, 1);
    ctl.submit(2, 0, 2);
    let batch = ctl.flush().unwrap();
    assert_eq!(batch.generation, 0);
    assert_eq!(payloads(&batch), vec![1, 2]);
    assert_eq!(ctl.buffer().current_generation(), 1);
    assert!(ctl.flush().is_none());
    assert_eq!(ctl.buffer().current_generation(), 1);
}

#[test]
fn process_timeouts_flushes_partial_batch() {
    let ticker = TimeoutTicker::new("controller-test-timeouts").unwrap();
    let config = ControllerConfig {
        buffer: BufferConfig {
            buffer_timeout: Duration::from_millis(30),
            check_interval: Duration::from_millis(5),
        },
        batch_size: 100,
    };
    let mut ctl: AsyncExecutionController<u32, u32> =
        AsyncExecutionController::new(config, Some(&ticker)).unwrap();

    ctl.submit(1, 0, 10);
    ctl.submit(2, 0, 20);
    std::thread::sleep(Duration::from_millis(150));

    let batches = ctl.process_timeouts();
    assert_eq!(batches.len(), 1);
    assert_eq!(payloads(&batches[0]), vec![10, 20]);
    assert_eq!(ctl.buffer().active_queue_size(), 0);
    assert!(!ctl.buffer().timer_armed());
    assert_ok!(ctl.close());
}

#[tokio::test]
async fn wait_timeout_delivers_generation() {
    let ticker = TimeoutTicker::new("controller-test-async").unwrap();
    let config = ControllerConfig {
        buffer: BufferConfig {
            buffer_timeout: Duration::from_millis(20),
            check_interval: Duration::from_millis(5),
        },
        batch_size: 100,
    };
    let mut ctl: AsyncExecutionController<u32, u32> =
        AsyncExecutionController::new(config, Some(&ticker)).unwrap();

    ctl.submit(3, 0, 30);
    let generation = tokio::time::timeout(Duration::from_secs(2), ctl.wait_timeout())
        .await
        .expect("timeout signal")
        .expect("channel open");
    assert_eq!(generation, 0);

    let batch = ctl.on_timeout(generation).unwrap();
    assert_eq!(payloads(&batch), vec![30]);
    // Replaying the same signal is a no-op.
    assert!(ctl.on_timeout(generation).is_none());
    assert_ok!(ctl.close());
}

#[test]
fn size_flush_makes_pending_timeout_stale() {
    let ticker = TimeoutTicker::new("controller-test-race").unwrap();
    let config = ControllerConfig {
        buffer: BufferConfig {
            buffer_timeout: Duration::from_millis(20),
            check_interval: Duration::from_millis(5),
        },
        batch_size: 2,
    };
    let mut ctl: AsyncExecutionController<u32, u32> =
        AsyncExecutionController::new(config, Some(&ticker)).unwrap();

    ctl.submit(1, 0, 1);
    std::thread::sleep(Duration::from_millis(80));
    // The timeout for generation 0 is already queued; a size flush wins first.
    let batch = ctl.submit(2, 0, 2).unwrap();
    assert_eq!(batch.len(), 2);
    assert!(ctl.process_timeouts().is_empty());
    assert_ok!(ctl.close());
}
