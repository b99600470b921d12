//! Monotonic clock source
//!
//! Timestamps are captured by the call-site wrapper immediately before and
//! after the real operation. A failed read is reported as a value, never
//! hidden: the exit hook decides that a failed read is fatal.
//!
//! On Unix the clock is `CLOCK_MONOTONIC_RAW` (Linux/Android) or
//! `CLOCK_MONOTONIC`, read through `clock_gettime`. Elsewhere the standard
//! library's monotonic `Instant` is measured against a process-wide anchor.
//! Either way a [`Timestamp`] is (seconds, nanoseconds), so two readings of
//! the same clock subtract into a [`CallDuration`](crate::duration::CallDuration).

use crate::duration::{CallDuration, NANOS_PER_SEC};
use crate::error::ClockError;

/// One reading of the monotonic clock, successful or not
pub type ClockReading = Result<Timestamp, ClockError>;

/// Point on the monotonic time line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    secs: u64,
    nanos: u32,
}

impl Timestamp {
    /// Build a timestamp, carrying excess nanoseconds into seconds
    pub fn new(secs: u64, nanos: u32) -> Self {
        Timestamp {
            secs: secs.saturating_add(u64::from(nanos / NANOS_PER_SEC)),
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    pub fn from_nanos(nanos: u64) -> Self {
        let per_sec = u64::from(NANOS_PER_SEC);
        Timestamp::new(nanos / per_sec, (nanos % per_sec) as u32)
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn subsec_nanos(&self) -> u32 {
        self.nanos
    }

    /// Elapsed time from `earlier` to `self`, zero if `earlier` is later
    pub fn duration_since(&self, earlier: Timestamp) -> CallDuration {
        let mut d = CallDuration::ZERO;
        if *self >= earlier {
            d.accumulate(earlier, *self);
        }
        d
    }
}

/// Granularity of a clock, captured once at initialization
///
/// Only used diagnostically: a zero resolution means the platform clock
/// did not initialize properly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolution(CallDuration);

impl Resolution {
    pub fn new(period: CallDuration) -> Self {
        Resolution(period)
    }

    pub fn period(&self) -> CallDuration {
        self.0
    }

    pub fn is_usable(&self) -> bool {
        !self.0.is_zero()
    }
}

/// Source of monotonic timestamps
pub trait ClockSource {
    /// Read the clock
    fn now(&self) -> ClockReading;

    /// Read the clock's resolution
    fn resolution(&self) -> Result<Resolution, ClockError>;
}

/// The platform monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock
    }
}

#[cfg(unix)]
mod platform {
    use nix::sys::time::TimeSpec;
    use nix::time::{clock_getres, clock_gettime, ClockId};

    use super::{Resolution, Timestamp};
    use crate::duration::CallDuration;
    use crate::error::ClockError;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const CLOCK: ClockId = ClockId::CLOCK_MONOTONIC_RAW;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const CLOCK: ClockId = ClockId::CLOCK_MONOTONIC;

    fn split(ts: TimeSpec) -> Result<(u64, u32), ClockError> {
        let secs = u64::try_from(ts.tv_sec()).map_err(|_| ClockError::OutOfRange)?;
        let nanos = u32::try_from(ts.tv_nsec()).map_err(|_| ClockError::OutOfRange)?;
        Ok((secs, nanos))
    }

    pub(super) fn now() -> Result<Timestamp, ClockError> {
        let ts = clock_gettime(CLOCK)
            .map_err(|errno| ClockError::ReadFailed(errno.desc().to_string()))?;
        let (secs, nanos) = split(ts)?;
        Ok(Timestamp::new(secs, nanos))
    }

    pub(super) fn resolution() -> Result<Resolution, ClockError> {
        let ts = clock_getres(CLOCK)
            .map_err(|errno| ClockError::ReadFailed(errno.desc().to_string()))?;
        let (secs, nanos) = split(ts)?;
        Ok(Resolution::new(CallDuration::new(secs, nanos)))
    }
}

#[cfg(not(unix))]
mod platform {
    use std::sync::OnceLock;
    use std::time::Instant;

    use super::{Resolution, Timestamp};
    use crate::duration::CallDuration;
    use crate::error::ClockError;

    static ANCHOR: OnceLock<Instant> = OnceLock::new();

    pub(super) fn now() -> Result<Timestamp, ClockError> {
        let elapsed = ANCHOR.get_or_init(Instant::now).elapsed();
        Ok(Timestamp::new(elapsed.as_secs(), elapsed.subsec_nanos()))
    }

    pub(super) fn resolution() -> Result<Resolution, ClockError> {
        // Instant exposes no resolution; report the finest unit it carries
        Ok(Resolution::new(CallDuration::from_nanos(1)))
    }
}

impl ClockSource for MonotonicClock {
    #[inline]
    fn now(&self) -> ClockReading {
        platform::now()
    }

    fn resolution(&self) -> Result<Resolution, ClockError> {
        platform::resolution()
    }
}
