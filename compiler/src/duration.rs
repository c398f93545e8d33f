// duration.rs — Physical durations with units
//
// A duration is a value plus a time unit; comparisons and arithmetic go
// through the real-time value so `64dt == 32ns` holds. Addition keeps
// the unit of the left operand.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::ast::TimeUnit;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Duration {
    pub value: f64,
    pub unit: TimeUnit,
}

impl Duration {
    pub fn new(value: f64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    /// Duration in seconds.
    pub fn real_time(&self) -> f64 {
        self.value * self.unit.in_seconds()
    }

    /// Change the unit, rescaling the stored value so the real time is
    /// unchanged.
    pub fn set_unit(&mut self, unit: TimeUnit) {
        self.value = self.real_time() / unit.in_seconds();
        self.unit = unit;
    }

    /// Number of samples at the given sample rate, rounded.
    pub fn samples(&self, sample_rate: f64) -> i64 {
        (self.real_time() * sample_rate).round() as i64
    }
}

impl Default for Duration {
    fn default() -> Self {
        Self::new(0.0, TimeUnit::Dt)
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        let total = self.real_time() + rhs.real_time();
        Duration::new(total / self.unit.in_seconds(), self.unit)
    }
}

impl Add<f64> for Duration {
    type Output = Duration;

    /// Plain numbers are interpreted in the left operand's unit.
    fn add(self, rhs: f64) -> Duration {
        Duration::new(self.value + rhs, self.unit)
    }
}

impl PartialEq for Duration {
    fn eq(&self, other: &Self) -> bool {
        self.real_time() == other.real_time()
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.real_time().partial_cmp(&other.real_time())
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit.suffix())
    }
}
