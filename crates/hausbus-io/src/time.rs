//! Bus clock.

use std::ops::Sub;

use serde::{Deserialize, Serialize};

/// A point on the bus clock, in seconds.
///
/// The scheduler never reads the system clock itself; the caller passes the
/// current time into every tick. Tests drive the clock directly, production
/// callers derive it from a monotonic source.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct BusTime(f64);

impl BusTime {
    /// Time zero.
    pub const ZERO: BusTime = BusTime(0.0);

    /// Create a time from seconds.
    pub fn from_secs(secs: f64) -> Self {
        BusTime(secs)
    }

    /// The time as seconds.
    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// The time `secs` seconds after this one.
    pub fn plus(&self, secs: f64) -> BusTime {
        BusTime(self.0 + secs)
    }

    /// Seconds elapsed since `earlier`.
    pub fn since(&self, earlier: BusTime) -> f64 {
        self.0 - earlier.0
    }
}

impl Sub for BusTime {
    type Output = f64;

    fn sub(self, rhs: BusTime) -> f64 {
        self.since(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_time_arithmetic() {
        let t = BusTime::from_secs(10.0);
        assert_eq!(t.plus(3.5).as_secs(), 13.5);
        assert_eq!(t.plus(3.5) - t, 3.5);
        assert!(t.plus(0.1) > t);
    }
}
