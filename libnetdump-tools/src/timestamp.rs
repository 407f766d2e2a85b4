use serde::Serialize;
use std::fmt;

/// Capture timestamp, in seconds and microseconds since the Unix epoch
///
/// Like the pcap record header: no nanoseconds, no panicking arithmetic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, Serialize)]
pub struct Timestamp {
    pub secs: u32,
    pub micros: u32,
}

pub const MICROS_PER_SEC: u32 = 1_000_000;

impl Timestamp {
    pub fn new(secs: u32, micros: u32) -> Timestamp {
        // normalize, some writers emit micros >= 1s
        Timestamp {
            secs: secs.wrapping_add(micros / MICROS_PER_SEC),
            micros: micros % MICROS_PER_SEC,
        }
    }

    /// Build from a fractional part expressed in `units_per_sec` (e.g. nanoseconds)
    pub fn from_fraction(secs: u32, frac: u64, units_per_sec: u64) -> Timestamp {
        if units_per_sec == 0 {
            return Timestamp::new(secs, 0);
        }
        let micros = (u128::from(frac) * u128::from(MICROS_PER_SEC) / u128::from(units_per_sec))
            as u32;
        Timestamp::new(secs, micros)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}
