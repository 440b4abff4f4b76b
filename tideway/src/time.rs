use chrono::DateTime;
use chrono::naive::NaiveDateTime;
use derive_more::Display;
use derive_new::new;
use formato::Formato;
use once_cell::sync::Lazy;
use quanta::Clock;
use serde::{Deserialize, Serialize};
use std::convert::From;
use std::ops::{Add, Sub};
use std::time::Duration;

type RawTime = i64;

static CLOCK: Lazy<Clock> = Lazy::new(Clock::new);

/// A time in nanoseconds since the unix epoch.
///
/// [NanoTime::INVALID] is the sentinel for "no time": an [Envelope](crate::Envelope)
/// that was never stamped carries it, and arithmetic on it is meaningless.
#[derive(
    new,
    Display,
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
)]
pub struct NanoTime(RawTime);

impl NanoTime {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(RawTime::MAX);
    pub const INVALID: Self = Self(RawTime::MIN);
    pub const NANOS_PER_SECOND: RawTime = 1_000_000_000;
    pub const SECONDS_PER_NANO: f64 = 1e-9;

    pub fn now() -> Self {
        Self(CLOCK.now().as_u64() as RawTime)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != RawTime::MIN
    }

    pub fn pretty(&self) -> String {
        (self.0 as f64 * Self::SECONDS_PER_NANO).formato("#,###.000_000")
    }

    /// Nanoseconds as a raw count.  Zero for the sentinel.
    pub fn nanos(&self) -> RawTime {
        if self.is_valid() { self.0 } else { 0 }
    }
}

impl Default for NanoTime {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<i64> for NanoTime {
    fn from(t: i64) -> Self {
        NanoTime(t)
    }
}

impl From<u64> for NanoTime {
    fn from(t: u64) -> Self {
        NanoTime(t as RawTime)
    }
}

impl From<Duration> for NanoTime {
    fn from(dur: Duration) -> Self {
        Self(dur.as_secs() as RawTime * Self::NANOS_PER_SECOND + dur.subsec_nanos() as RawTime)
    }
}

impl TryFrom<NaiveDateTime> for NanoTime {
    type Error = anyhow::Error;
    fn try_from(date_time: NaiveDateTime) -> anyhow::Result<Self> {
        let t = date_time.and_utc().timestamp_nanos_opt().ok_or_else(|| {
            anyhow::anyhow!("timestamp out of range for nanosecond representation")
        })?;
        Ok(NanoTime(t))
    }
}

impl From<NanoTime> for f64 {
    fn from(t: NanoTime) -> Self {
        t.0 as f64
    }
}

impl From<NanoTime> for i64 {
    fn from(t: NanoTime) -> Self {
        t.0
    }
}

impl TryFrom<NanoTime> for NaiveDateTime {
    type Error = anyhow::Error;
    fn try_from(t: NanoTime) -> anyhow::Result<Self> {
        DateTime::from_timestamp(
            t.0.div_euclid(NanoTime::NANOS_PER_SECOND),
            t.0.rem_euclid(NanoTime::NANOS_PER_SECOND) as u32,
        )
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| anyhow::anyhow!("NanoTime out of range for DateTime"))
    }
}

impl From<NanoTime> for Duration {
    fn from(t: NanoTime) -> Self {
        Duration::from_nanos(t.nanos().max(0) as u64)
    }
}

impl Add<NanoTime> for NanoTime {
    type Output = Self;
    fn add(self, other: Self) -> Self::Output {
        Self(self.0 + other.0)
    }
}

impl Add<RawTime> for NanoTime {
    type Output = Self;
    fn add(self, other: RawTime) -> Self::Output {
        Self(self.0 + other)
    }
}

impl Add<Duration> for NanoTime {
    type Output = Self;
    fn add(self, other: Duration) -> Self::Output {
        Self(self.0 + other.as_nanos() as RawTime)
    }
}

impl Sub<NanoTime> for NanoTime {
    type Output = Self;
    fn sub(self, other: Self) -> Self::Output {
        Self(self.0 - other.0)
    }
}
