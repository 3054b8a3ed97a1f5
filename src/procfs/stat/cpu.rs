//! This module contains facilities for parsing and storing the data contained
//! in the "cpu" sections of /proc/stat.
//!
//! Each "cpu" line holds a number of tick counters, whose amount depends on
//! the kernel version: user, nice, system and idle are always there, iowait
//! appeared in Linux 2.5.41, irq and softirq in 2.6.0-test4, steal in 2.6.11,
//! guest in 2.6.24 and guest_nice in 2.6.33. Timers that the kernel does not
//! provide are left at zero.

use crate::clock::ClockTicks;
use crate::delta::{checked_sum, counter_delta, Ratio, PERCENT};
use crate::error::{Error, ParseCause};
use crate::splitter::SplitColumns;
use serde::{Deserialize, Serialize};
use std::time::Duration;


/// The amount of CPU time that one CPU (or all of them) spent in various
/// states, in kernel ticks since boot. All of these are monotonic counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTimes {
    /// None for the aggregate of all CPUs, Some(N) for "cpuN"
    pub id: Option<u16>,

    /// Time spent in user mode (guest time included)
    pub user: u64,

    /// Time spent in user mode with low priority (nice)
    pub nice: u64,

    /// Time spent in system (aka kernel) mode
    pub system: u64,

    /// Time spent in the idle task (should match second entry in /proc/uptime)
    pub idle: u64,

    /// Time spent waiting for IO to complete
    pub iowait: u64,

    /// Time spent servicing hardware interrupts
    pub irq: u64,

    /// Time spent servicing softirqs
    pub softirq: u64,

    /// "Stolen" time spent in other operating systems when running in a
    /// virtualized environment
    pub steal: u64,

    /// Time spent running a virtual CPU for guest OSs
    pub guest: u64,

    /// Time spent running a niced guest
    pub guest_nice: u64,
}
//
impl CpuTimes {
    /// Decode the tick counters of a "cpu" line, the key being already
    /// consumed. Problems are reported in `errors`, with the affected
    /// counters left at zero.
    pub(super) fn parse(id: Option<u16>,
                        mut columns: SplitColumns,
                        errors: &mut Vec<Error>) -> Self {
        let mut times = Self { id, ..Self::default() };

        // The first four timers are mandatory, the other ones depend on the
        // kernel version
        {
            let counters = [
                ("user", &mut times.user, true),
                ("nice", &mut times.nice, true),
                ("system", &mut times.system, true),
                ("idle", &mut times.idle, true),
                ("iowait", &mut times.iowait, false),
                ("irq", &mut times.irq, false),
                ("softirq", &mut times.softirq, false),
                ("steal", &mut times.steal, false),
                ("guest", &mut times.guest, false),
                ("guest_nice", &mut times.guest_nice, false),
            ];
            for (name, counter, mandatory) in counters {
                let result = match columns.next() {
                    Some(field) => field.parse_u64(),
                    None if mandatory => Err(ParseCause::MissingField),
                    None => break,
                };
                match result {
                    Ok(ticks) => *counter = ticks,
                    Err(cause) => {
                        // Without a mandatory field, the line is truncated
                        let truncated = cause == ParseCause::MissingField;
                        errors.push(Error::parse(field_name(id, name), cause));
                        if truncated { break; }
                    },
                }
            }
        }
        times
    }

    /// Total accounted CPU time. Guest time is already included in user
    /// time, so it is not counted twice. None if it does not fit in 64 bits.
    pub fn total(&self) -> Option<u64> {
        [self.nice, self.system, self.idle, self.iowait, self.irq,
         self.softirq, self.steal].iter()
                                  .try_fold(self.user, |sum, &t| {
                                      sum.checked_add(t)
                                  })
    }

    /// Compute the CPU usage between two readouts of the same CPU, which
    /// were taken `elapsed` apart. Return None if the CPUs differ.
    pub(super) fn usage(prior: &Self,
                        current: &Self,
                        elapsed: Duration,
                        clock: ClockTicks) -> Result<Option<CpuUsage>, Error>
    {
        if prior.id != current.id { return Ok(None); }
        let id = current.id;
        let delta = |name: &str, old: u64, new: u64| {
            counter_delta(&field_name(id, name), old, new)
        };

        // Compute the tick deltas
        let user = delta("user", prior.user, current.user)?;
        let nice = delta("nice", prior.nice, current.nice)?;
        let system = delta("system", prior.system, current.system)?;
        let idle = delta("idle", prior.idle, current.idle)?;
        let iowait = delta("iowait", prior.iowait, current.iowait)?;
        let irq = delta("irq", prior.irq, current.irq)?;
        let softirq = delta("softirq", prior.softirq, current.softirq)?;
        let steal = delta("steal", prior.steal, current.steal)?;
        let guest = delta("guest", prior.guest, current.guest)?;
        let guest_nice = delta("guest_nice", prior.guest_nice,
                               current.guest_nice)?;

        // Active time is everything but idle time and I/O waits
        let total = checked_sum(&field_name(id, "total"),
                                &[user, nice, system, idle, iowait, irq,
                                  softirq, steal])?;
        let active = total - idle - iowait;

        Ok(Some(CpuUsage {
            id,
            user: clock.to_duration(user),
            nice: clock.to_duration(nice),
            system: clock.to_duration(system),
            idle: clock.to_duration(idle),
            iowait: clock.to_duration(iowait),
            irq: clock.to_duration(irq),
            softirq: clock.to_duration(softirq),
            steal: clock.to_duration(steal),
            guest: clock.to_duration(guest),
            guest_nice: clock.to_duration(guest_nice),
            usage: Ratio::fraction(active, total, elapsed, PERCENT),
        }))
    }
}


/// CPU time spent in various states between two snapshots
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    /// None for the aggregate of all CPUs, Some(N) for "cpuN"
    pub id: Option<u16>,

    /// Time spent in user mode
    pub user: Duration,

    /// Time spent in user mode with low priority
    pub nice: Duration,

    /// Time spent in kernel mode
    pub system: Duration,

    /// Time spent idle
    pub idle: Duration,

    /// Time spent waiting for IO to complete
    pub iowait: Duration,

    /// Time spent servicing hardware interrupts
    pub irq: Duration,

    /// Time spent servicing softirqs
    pub softirq: Duration,

    /// Time stolen by the hypervisor
    pub steal: Duration,

    /// Time spent running guests
    pub guest: Duration,

    /// Time spent running niced guests
    pub guest_nice: Duration,

    /// Percentage of accounted time that was not spent idle or waiting
    pub usage: Ratio,
}


/// INTERNAL: Name of a CPU counter in error messages, e.g. "cpu3.idle"
fn field_name(id: Option<u16>, counter: &str) -> String {
    match id {
        Some(id) => format!("cpu{}.{}", id, counter),
        None => format!("cpu.{}", counter),
    }
}
