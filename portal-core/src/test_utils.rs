// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures for tests across the portal crates.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::clock::Clock;
use crate::timestamp::Timestamp;

/// Clock which only moves when told to.
///
/// Cloned instances share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start.as_millis())),
        }
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.millis.store(timestamp.as_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.millis.load(Ordering::SeqCst))
    }
}

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

#[test]
fn manual_clock_is_shared_between_clones() {
    let clock = ManualClock::new(Timestamp::new(1_000));
    let other = clock.clone();

    clock.advance(Duration::from_millis(500));
    assert_eq!(other.now(), Timestamp::new(1_500));

    other.set(Timestamp::new(10));
    assert_eq!(clock.now(), Timestamp::new(10));
}
