// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Debug;

use crate::timestamp::Timestamp;

/// Source of wall-clock time.
///
/// Components reading the time (sequence numbers, chess clocks, validity windows) receive a clock
/// on construction instead of calling the system time directly, tests inject a manual one.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the operating system's time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
