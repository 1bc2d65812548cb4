//! Nanosecond timestamps.
//!
//! All measurements carry a [`Timestamp`]: unsigned nanoseconds since the Unix
//! epoch. Differences between timestamps are signed nanoseconds (`i64`) since
//! pulls frequently ask for times slightly before the latest sample.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds per millisecond.
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point in time, in nanoseconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch itself.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Current wall-clock time.
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_nanos)
            .unwrap_or(0);
        Timestamp(nanos)
    }

    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(NANOS_PER_MILLI))
    }

    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp((secs.max(0.0) * NANOS_PER_SEC as f64) as u64)
    }

    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / NANOS_PER_MILLI
    }

    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Signed difference `self - earlier` in nanoseconds.
    #[must_use]
    pub fn nanos_since(self, earlier: Timestamp) -> i64 {
        (self.0 as i128 - earlier.0 as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Shift by a signed number of nanoseconds, saturating at the epoch.
    #[must_use]
    pub fn offset_nanos(self, delta: i64) -> Self {
        if delta >= 0 {
            Timestamp(self.0.saturating_add(delta as u64))
        } else {
            Timestamp(self.0.saturating_sub(delta.unsigned_abs()))
        }
    }

    /// Shift by a signed number of milliseconds.
    #[must_use]
    pub fn offset_millis(self, delta: i64) -> Self {
        self.offset_nanos(delta.saturating_mul(NANOS_PER_MILLI as i64))
    }

    /// Scale the offset from `origin` by `factor`.
    ///
    /// Used for replay speed-up: `origin + (self - origin) * factor`.
    #[must_use]
    pub fn scale_from(self, origin: Timestamp, factor: f64) -> Self {
        let delta = self.nanos_since(origin) as f64 * factor;
        origin.offset_nanos(delta as i64)
    }

    /// Absolute distance between two timestamps.
    #[must_use]
    pub fn abs_diff(self, other: Timestamp) -> Duration {
        Duration::from_nanos(self.0.abs_diff(other.0))
    }

    /// Time remaining from now until `self`, zero if already passed.
    pub fn until(self) -> Duration {
        let now = Timestamp::now();
        if self > now {
            Duration::from_nanos(self.0 - now.0)
        } else {
            Duration::ZERO
        }
    }

    /// Short human readable form, `HH:MM:SS.mmm` in UTC.
    pub fn to_short_string(self) -> String {
        let secs = (self.0 / NANOS_PER_SEC) as i64;
        let nanos = (self.0 % NANOS_PER_SEC) as u32;
        match chrono::DateTime::from_timestamp(secs, nanos) {
            Some(dt) => dt.format("%H:%M:%S%.3f").to_string(),
            None => self.0.to_string(),
        }
    }
}

/// Nanoseconds in `d`, clamped to the timestamp range.
fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(duration_nanos(rhs)))
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(duration_nanos(rhs)))
    }
}

impl From<u64> for Timestamp {
    fn from(nanos: u64) -> Self {
        Timestamp(nanos)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_round_trip() {
        let t = Timestamp::from_millis(1050);
        assert_eq!(t.as_nanos(), 1_050_000_000);
        assert_eq!(t.as_millis(), 1050);
    }

    #[test]
    fn test_signed_difference() {
        let a = Timestamp::from_millis(1000);
        let b = Timestamp::from_millis(1200);
        assert_eq!(b.nanos_since(a), 200_000_000);
        assert_eq!(a.nanos_since(b), -200_000_000);
    }

    #[test]
    fn test_offset_saturates_at_epoch() {
        let t = Timestamp::from_nanos(10);
        assert_eq!(t.offset_nanos(-100), Timestamp::ZERO);
        assert_eq!(t.offset_millis(1).as_nanos(), 1_000_010);
    }

    #[test]
    fn test_duration_arithmetic() {
        let t = Timestamp::from_millis(100);
        assert_eq!(t + Duration::from_millis(5), Timestamp::from_millis(105));
        assert_eq!(t - Duration::from_millis(5), Timestamp::from_millis(95));
    }

    #[test]
    fn test_huge_duration_saturates() {
        let t = Timestamp::from_millis(100);
        assert_eq!(t + Duration::MAX, Timestamp(u64::MAX));
        assert_eq!(t + Duration::from_secs(u64::MAX / 1_000), Timestamp(u64::MAX));
        assert_eq!(t - Duration::MAX, Timestamp::ZERO);
    }

    #[test]
    fn test_scale_from_origin() {
        let origin = Timestamp::from_millis(1000);
        let t = Timestamp::from_millis(1400);
        assert_eq!(t.scale_from(origin, 0.5), Timestamp::from_millis(1200));
    }

    #[test]
    fn test_now_is_monotonic_enough() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(b >= a);
        assert!(a.as_secs_f64() > 1.0e9);
    }
}
