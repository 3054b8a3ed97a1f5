//! Kernel clock ticks, the time unit of CPU accounting in /proc/stat
//!
//! The tick rate (USER_HZ) is a property of the running system which cannot
//! change during the lifetime of a process, so it is queried once, on first
//! use, and cached for the rest of the process' lifetime. Initialization is
//! guarded by lazy_static's Once, subsequent reads are lock-free.

use lazy_static::lazy_static;
use std::time::Duration;
use tracing::{debug, warn};


/// Tick rate which Linux has been exporting to userspace for ages
const FALLBACK_TICKS_PER_SEC: u64 = 100;


lazy_static! {
    /// Number of CPU ticks from the statistics of /proc/stat in one second
    static ref TICKS_PER_SEC: u64 = {
        // This is safe: sysconf has no precondition and does not touch memory
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if ticks > 0 {
            debug!(ticks, "resolved kernel clock tick rate");
            ticks as u64
        } else {
            warn!(fallback = FALLBACK_TICKS_PER_SEC,
                  "sysconf(_SC_CLK_TCK) failed, assuming the default rate");
            FALLBACK_TICKS_PER_SEC
        }
    };
}


/// Conversion factor between kernel ticks and time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockTicks {
    /// How many ticks make a second
    per_second: u64,
}
//
impl ClockTicks {
    /// Resolve the tick rate of the host system, or use the cached value if
    /// it has been resolved before
    pub fn resolve() -> Self {
        Self { per_second: *TICKS_PER_SEC }
    }

    /// Use a known tick rate (useful when analyzing data from another host)
    ///
    /// A rate of zero makes no sense and is replaced by the default rate.
    ///
    pub fn from_hz(per_second: u64) -> Self {
        Self {
            per_second: if per_second == 0 { FALLBACK_TICKS_PER_SEC }
                        else { per_second },
        }
    }

    /// Number of ticks in one second
    pub fn per_second(&self) -> u64 {
        self.per_second
    }

    /// Convert an amount of ticks into a Duration
    pub fn to_duration(&self, ticks: u64) -> Duration {
        let secs = ticks / self.per_second;
        let nanosecs = (ticks % self.per_second) * 1_000_000_000
                           / self.per_second;
        Duration::new(secs, nanosecs as u32)
    }
}
