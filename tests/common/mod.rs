//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use trackflow::dataflow::{Network, PortOwner, PushConsumer, PushSupplier};
use trackflow::measurement::{Measurement, Payload, Timestamp};

pub type Collected<T> = Arc<Mutex<Vec<Measurement<T>>>>;

/// How long asynchronous tests wait for events to arrive
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Poll `condition` until it holds or the test timeout passes.
pub fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn at<T>(ms: u64, value: T) -> Measurement<T> {
    Measurement::new(Timestamp::from_millis(ms), value)
}

/// Supplier pushing into the push input `port` of a built network.
pub fn feed<T: Payload>(network: &Network, component: &str, port: &str) -> PushSupplier<T> {
    let supplier = PushSupplier::new(
        format!("to_{component}_{port}"),
        PortOwner::detached("test"),
        network.queue().clone(),
    );
    let consumer: PushConsumer<T> = network.port(component, port).unwrap();
    supplier.connect(&consumer).unwrap();
    supplier
}

/// Everything pushed on the output `port` of a built network.
pub fn collect<T: Payload>(network: &Network, component: &str, port: &str) -> Collected<T> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let consumer = PushConsumer::new(
        format!("from_{component}_{port}"),
        PortOwner::detached("test"),
        move |m| {
            s.lock().push(m);
            Ok(())
        },
    );
    let supplier: PushSupplier<T> = network.port(component, port).unwrap();
    supplier.connect(&consumer).unwrap();
    seen
}

pub fn values<T: Clone>(seen: &Collected<T>) -> Vec<T> {
    seen.lock().iter().map(|m| m.value().unwrap().clone()).collect()
}

pub fn times<T>(seen: &Collected<T>) -> Vec<u64> {
    seen.lock().iter().map(|m| m.time().as_millis()).collect()
}
