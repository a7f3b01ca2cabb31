//! Wall-clock timestamps.
//!
//! Buffers carry an optional presentation timestamp and clients track a
//! last-activity timestamp; both are plain nanoseconds since the Unix epoch.
//! There is no calibrated rdtsc clock here: the producer/I/O split in this
//! crate runs at socket speed, not at sub-microsecond budgets, so
//! `std::time` is the right tool.

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nanos(pub u64);

impl Nanos {
    pub const ZERO: Nanos = Nanos(0);

    #[inline]
    pub fn now() -> Self {
        let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Nanos(d.as_nanos() as u64)
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Nanos) -> Nanos {
        Nanos(self.0.saturating_sub(rhs.0))
    }
}

impl From<u64> for Nanos {
    fn from(value: u64) -> Self {
        Nanos(value)
    }
}

impl From<Nanos> for u64 {
    fn from(value: Nanos) -> Self {
        value.0
    }
}
