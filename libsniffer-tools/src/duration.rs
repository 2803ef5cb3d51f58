use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Capture timestamp: seconds and microseconds since the Unix epoch
///
/// This mirrors the `timeval` reported by capture sources. It is panic-free:
/// differences are computed as signed floating point seconds, since capture
/// clocks are not guaranteed to be monotonic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, Serialize)]
pub struct Duration {
    pub secs: u32,
    pub micros: u32,
}

pub const MICROS_PER_SEC: u32 = 1_000_000;

impl Duration {
    /// Build Duration from secs and micros
    ///
    /// Microseconds overflowing one second are carried into `secs`.
    pub fn new(secs: u32, micros: u32) -> Duration {
        Duration {
            secs: secs.wrapping_add(micros / MICROS_PER_SEC),
            micros: micros % MICROS_PER_SEC,
        }
    }

    /// Current wall-clock time
    pub fn now() -> Duration {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Duration::new(d.as_secs() as u32, d.subsec_micros()),
            Err(_) => Duration::default(),
        }
    }

    /// Signed number of seconds elapsed from `earlier` to `self`
    ///
    /// The result is negative when `earlier` is after `self`.
    pub fn seconds_since(self, earlier: Duration) -> f64 {
        let secs = i64::from(self.secs) - i64::from(earlier.secs);
        let micros = i64::from(self.micros) - i64::from(earlier.micros);
        secs as f64 + micros as f64 / f64::from(MICROS_PER_SEC)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}
