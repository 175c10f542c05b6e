// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Display;
use std::hash::Hash as StdHash;
use std::ops::Add;
use std::time::Duration;
#[cfg(not(test))]
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(test)]
use mock_instant::thread_local::{SystemTime, UNIX_EPOCH};
use serde::{Deserialize, Serialize};

/// Milliseconds since the UNIX epoch based on system time.
#[derive(
    Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, StdHash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current system time.
    ///
    /// A clock set before the UNIX epoch yields the epoch itself.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or_default();
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time passed since an earlier timestamp, zero if `earlier` lies in the future.
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

impl From<Timestamp> for u64 {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number of a row: hybrid wall-clock and logical timestamp.
///
/// A writer derives the sequence number of a new row from the head of the entity it has read
/// (see [`Seq::after`]). The result moves forwards with wall time, but if the clock stands still
/// or lags behind the observed head, the logical counter guarantees that the new row still sorts
/// _after_ everything the writer has seen.
///
/// Independent writers which have not observed each other's rows can still produce equal
/// sequence numbers. Stores detect this with conditional appends and reconstruction breaks the
/// remaining ties by row hash.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, StdHash, Serialize, Deserialize)]
pub struct Seq(Timestamp, u32);

impl Seq {
    pub fn from_parts(timestamp: Timestamp, logical: u32) -> Self {
        Self(timestamp, logical)
    }

    /// Sequence number for a new row written at `now` by a writer who observed `previous` as the
    /// latest version of the entity.
    pub fn after(previous: Option<Seq>, now: Timestamp) -> Self {
        match previous {
            Some(Seq(timestamp, logical)) if now <= timestamp => {
                Self(timestamp, logical.saturating_add(1))
            }
            _ => Self(now, 0),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.0
    }

    pub fn logical(&self) -> u32 {
        self.1
    }
}

impl Display for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}
