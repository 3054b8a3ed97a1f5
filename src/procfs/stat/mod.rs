//! This module contains a sampling parser for /proc/stat
//!
//! /proc/stat is a list of records, one per line, each starting with a key:
//!
//! ```text
//! cpu  5641 0 741 57868 75 0 0 48 0 0
//! cpu0 5641 0 741 57868 75 0 0 48 0 0
//! intr 46971 0 0 0 ...
//! ctxt 95746
//! btime 1760400000
//! processes 1221
//! procs_running 1
//! procs_blocked 0
//! softirq 31483 0 6633 1 1 0 0 8 0 0 24840
//! ```
//!
//! The aggregate "cpu" record comes first, followed by one "cpuN" record per
//! online CPU. Everything is a monotonic counter, except for procs_running
//! and procs_blocked (gauges) and btime (a constant).

mod cpu;
mod interrupts;
mod paging;

pub use self::cpu::{CpuTimes, CpuUsage};
pub use self::interrupts::Interrupts;
pub use self::paging::Paging;

use chrono::{DateTime, TimeZone, Utc};
use crate::clock::ClockTicks;
use crate::delta::{counter_delta, elapsed, match_entities, DeltaComputer,
                   Ratio};
use crate::error::{Error, ParseCause, Partial};
use crate::parser::{parse_into, PseudoFileParser};
use crate::snapshot::Snapshot;
use crate::splitter::{parse_u64, Delimiters, Field, SplitColumns,
                      SplitLines};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;


/// Parser for /proc/stat
///
/// The parser remembers how many CPUs it saw last time, so that it can size
/// its output right from the start on the next run.
///
#[derive(Debug, Default)]
pub struct StatParser {
    /// Number of "cpu" records in the last parsed sample
    cpu_records: usize,
}
//
impl PseudoFileParser for StatParser {
    type Data = Stat;

    const PATH: &'static str = "stat";

    fn parse(&mut self, contents: &[u8], errors: &mut Vec<Error>) -> Stat {
        let mut stat = Stat {
            cpus: Vec::with_capacity(self.cpu_records),
            ..Stat::default()
        };

        for line in SplitLines::new(contents, Delimiters::SPACE) {
            // Records are identified by their first field
            let mut columns = line.columns();
            let key = match columns.next() {
                Some(key) => key,
                None => continue,
            };

            match key.as_bytes() {
                // Aggregate and per-CPU timing statistics
                b"cpu" => stat.cpus.push(CpuTimes::parse(None, columns,
                                                         errors)),
                // "cpuN" records. Other "cpu*" keys are unknown records.
                [b'c', b'p', b'u', id @ ..]
                    if id.first().is_some_and(u8::is_ascii_digit) =>
                {
                    match parse_cpu_id(id) {
                        Ok(id) => {
                            stat.cpus.push(CpuTimes::parse(Some(id), columns,
                                                           errors));
                        },
                        Err(cause) => {
                            errors.push(Error::parse(key.to_owned_string(),
                                                     cause));
                        },
                    }
                },

                // Paging statistics
                b"page" => {
                    stat.paging = Some(Paging::parse("page", columns, errors));
                },
                b"swap" => {
                    stat.swapping = Some(Paging::parse("swap", columns,
                                                       errors));
                },

                // Hardware and software interrupt statistics
                b"intr" => {
                    stat.interrupts = Interrupts::parse("intr", columns,
                                                        errors);
                },
                b"softirq" => {
                    stat.softirqs = Interrupts::parse("softirq", columns,
                                                      errors);
                },

                // Single-number records
                b"ctxt" => parse_into(&mut stat.context_switches, "ctxt",
                                      parse_counter(columns), errors),
                b"processes" => parse_into(&mut stat.process_forks,
                                           "processes",
                                           parse_counter(columns), errors),
                b"procs_running" => parse_into(&mut stat.procs_running,
                                               "procs_running",
                                               parse_counter(columns),
                                               errors),
                b"procs_blocked" => parse_into(&mut stat.procs_blocked,
                                               "procs_blocked",
                                               parse_counter(columns),
                                               errors),
                b"btime" => parse_into(&mut stat.boot_time, "btime",
                                       parse_boot_time(columns).map(Some),
                                       errors),

                // Newer kernels may add records that we do not know about
                other => {
                    trace!(key = %String::from_utf8_lossy(other),
                           "skipping unknown /proc/stat record");
                },
            }
        }

        self.cpu_records = stat.cpus.len();
        stat
    }
}


/// Contents of /proc/stat
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    /// CPU timing statistics, aggregate of all CPUs first, then each CPU
    pub cpus: Vec<CpuTimes>,

    /// Paging activity (only on older kernels)
    pub paging: Option<Paging>,

    /// Swapping activity (only on older kernels)
    pub swapping: Option<Paging>,

    /// Hardware interrupt statistics
    pub interrupts: Interrupts,

    /// Number of context switches since boot
    pub context_switches: u64,

    /// Time at which the system booted
    pub boot_time: Option<DateTime<Utc>>,

    /// Number of processes and threads created since boot
    pub process_forks: u64,

    /// Number of runnable threads (gauge)
    pub procs_running: u64,

    /// Number of threads blocked waiting for I/O (gauge)
    pub procs_blocked: u64,

    /// Software interrupt statistics
    pub softirqs: Interrupts,
}
//
impl Stat {
    /// Aggregated timing statistics of all CPUs, if the kernel provided them
    pub fn total_cpu(&self) -> Option<&CpuTimes> {
        self.cpus.first().filter(|cpu| cpu.id.is_none())
    }

    /// Timing statistics of individual CPUs
    pub fn per_cpu(&self) -> &[CpuTimes] {
        let skip = usize::from(self.total_cpu().is_some());
        &self.cpus[skip..]
    }
}
//
impl DeltaComputer for Stat {
    type Delta = StatDelta;

    fn delta(prior: &Snapshot<Self>,
             current: &Snapshot<Self>,
             clock: ClockTicks) -> Result<Partial<StatDelta>, Error> {
        let time_delta = elapsed(prior, current)?;
        let mut errors = Vec::new();

        // Compare CPU timings, CPU by CPU
        let cpus = match_entities(&prior.cpus, &current.cpus, &mut errors,
                                  |old, new| {
            CpuTimes::usage(old, new, time_delta, clock)
        })?;

        // Compare paging statistics, if both snapshots have them
        let paging_delta = |name, old: &Option<Paging>, new: &Option<Paging>| {
            match (old, new) {
                (Some(old), Some(new)) => Paging::delta(name, old, new)
                                                 .map(Some),
                _ => Ok(None),
            }
        };
        let paging = paging_delta("page", &prior.paging, &current.paging)?;
        let swapping = paging_delta("swap", &prior.swapping,
                                    &current.swapping)?;

        // Compare the other counters
        let interrupts = Interrupts::delta("intr", &prior.interrupts,
                                           &current.interrupts, &mut errors)?;
        let softirqs = Interrupts::delta("softirq", &prior.softirqs,
                                         &current.softirqs, &mut errors)?;
        let context_switches = counter_delta("ctxt", prior.context_switches,
                                             current.context_switches)?;
        let process_forks = counter_delta("processes", prior.process_forks,
                                          current.process_forks)?;

        Ok(Partial::with_errors(StatDelta {
            time_delta,
            cpus,
            paging,
            swapping,
            context_switch_rate: Ratio::rate(context_switches, time_delta),
            context_switches,
            fork_rate: Ratio::rate(process_forks, time_delta),
            process_forks,
            interrupt_rate: Ratio::rate(interrupts.total, time_delta),
            interrupts,
            softirqs,
        }, errors))
    }
}


/// Activity recorded by /proc/stat between two snapshots
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatDelta {
    /// Time elapsed between the two snapshots
    pub time_delta: Duration,

    /// CPU usage, aggregate first if available, then each CPU
    pub cpus: Vec<CpuUsage>,

    /// Pages moved in and out, if reported by both snapshots
    pub paging: Option<Paging>,

    /// Pages swapped in and out, if reported by both snapshots
    pub swapping: Option<Paging>,

    /// Number of context switches
    pub context_switches: u64,

    /// Context switches per second
    pub context_switch_rate: Ratio,

    /// Number of processes and threads created
    pub process_forks: u64,

    /// Process creations per second
    pub fork_rate: Ratio,

    /// Hardware interrupts serviced (total and per source)
    pub interrupts: Interrupts,

    /// Hardware interrupts per second
    pub interrupt_rate: Ratio,

    /// Software interrupts serviced (total and per source)
    pub softirqs: Interrupts,
}


/// INTERNAL: Decode the numerical identifier of a "cpuN" key
fn parse_cpu_id(id: &[u8]) -> Result<u16, ParseCause> {
    u16::try_from(parse_u64(id)?).map_err(|_| ParseCause::Overflow)
}

/// INTERNAL: Decode the value of a single-number record
fn parse_counter(mut columns: SplitColumns) -> Result<u64, ParseCause> {
    columns.expect().and_then(|field: Field| field.parse_u64())
}

/// INTERNAL: Decode the boot time, given in seconds since the Unix epoch
fn parse_boot_time(columns: SplitColumns)
    -> Result<DateTime<Utc>, ParseCause>
{
    let secs = parse_counter(columns)?;
    let secs = i64::try_from(secs).map_err(|_| ParseCause::Overflow)?;
    Utc.timestamp_opt(secs, 0)
       .single()
       .ok_or(ParseCause::Overflow)
}
