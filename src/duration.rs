//! Carry-safe duration accumulation
//!
//! Elapsed time is kept as a (seconds, nanoseconds) pair so that totals for
//! a long-running process never lose sub-microsecond precision. All
//! arithmetic is unsigned: a borrow is taken from the seconds component
//! before any subtraction that could go negative.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// Nanoseconds in one second (the fine-unit period)
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Cumulative time spent inside one operation
///
/// Invariant: `nanos < NANOS_PER_SEC`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallDuration {
    secs: u64,
    nanos: u32,
}

impl CallDuration {
    pub const ZERO: CallDuration = CallDuration { secs: 0, nanos: 0 };

    /// Build a duration, carrying excess nanoseconds into seconds
    pub fn new(secs: u64, nanos: u32) -> Self {
        let mut d = CallDuration::ZERO;
        d.add_parts(secs, nanos);
        d
    }

    pub fn from_nanos(nanos: u64) -> Self {
        let per_sec = u64::from(NANOS_PER_SEC);
        // remainder is < NANOS_PER_SEC, always fits
        Self::new(nanos / per_sec, (nanos % per_sec) as u32)
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn subsec_nanos(&self) -> u32 {
        self.nanos
    }

    /// Total nanoseconds (u128 so it cannot overflow)
    pub fn as_nanos(&self) -> u128 {
        u128::from(self.secs) * u128::from(NANOS_PER_SEC) + u128::from(self.nanos)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + f64::from(self.nanos) / f64::from(NANOS_PER_SEC)
    }

    pub fn is_zero(&self) -> bool {
        self.secs == 0 && self.nanos == 0
    }

    /// Add `end - start` to this total
    ///
    /// The caller guarantees `end >= start` (both come from the same
    /// monotonic clock). When the fine unit of `end` is below that of
    /// `start`, one second is borrowed and a full period is added before
    /// subtracting, so no intermediate value is ever negative. An inverted
    /// pair contributes nothing: the total never decreases.
    pub fn accumulate(&mut self, start: Timestamp, end: Timestamp) {
        debug_assert!(end >= start, "clock went backwards: {start:?} -> {end:?}");
        if end < start {
            return;
        }

        let (secs, nanos) = if end.subsec_nanos() < start.subsec_nanos() {
            // end.secs > start.secs here, so the borrow cannot underflow
            (
                end.secs() - start.secs() - 1,
                end.subsec_nanos() + NANOS_PER_SEC - start.subsec_nanos(),
            )
        } else {
            (
                end.secs() - start.secs(),
                end.subsec_nanos() - start.subsec_nanos(),
            )
        };
        self.add_parts(secs, nanos);
    }

    fn add_parts(&mut self, secs: u64, nanos: u32) {
        let carry_secs = u64::from(nanos / NANOS_PER_SEC);
        let nanos = nanos % NANOS_PER_SEC;

        // both operands < NANOS_PER_SEC, sum < 2^31
        let mut total_nanos = self.nanos + nanos;
        let mut total_secs = self.secs.saturating_add(secs).saturating_add(carry_secs);
        if total_nanos >= NANOS_PER_SEC {
            total_nanos -= NANOS_PER_SEC;
            total_secs = total_secs.saturating_add(1);
        }
        self.secs = total_secs;
        self.nanos = total_nanos;
    }
}

impl Add for CallDuration {
    type Output = CallDuration;

    fn add(mut self, rhs: CallDuration) -> CallDuration {
        self.add_parts(rhs.secs, rhs.nanos);
        self
    }
}

impl AddAssign for CallDuration {
    fn add_assign(&mut self, rhs: CallDuration) {
        self.add_parts(rhs.secs, rhs.nanos);
    }
}

impl From<Duration> for CallDuration {
    fn from(d: Duration) -> Self {
        CallDuration::new(d.as_secs(), d.subsec_nanos())
    }
}

impl From<CallDuration> for Duration {
    fn from(d: CallDuration) -> Self {
        Duration::new(d.secs, d.nanos)
    }
}

impl fmt::Display for CallDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.secs > 0 {
            write!(f, "{}.{:09}s", self.secs, self.nanos)
        } else if self.nanos >= 1_000_000 {
            write!(f, "{:.3}ms", f64::from(self.nanos) / 1_000_000.0)
        } else if self.nanos >= 1_000 {
            write!(f, "{:.3}µs", f64::from(self.nanos) / 1_000.0)
        } else {
            write!(f, "{}ns", self.nanos)
        }
    }
}
