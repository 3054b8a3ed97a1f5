//! This module contains a sampling parser for /proc/diskstats
//!
//! Each line describes one block device:
//!
//! ```text
//!    8       0 sda 4989 1823 345380 2521 11364 13565 622952 14730 0 9284 17660 0 0 0 0 142 407
//! ```
//!
//! The first three fields are the major and minor device numbers and the
//! device name. They are followed by 11 I/O counters, then by 4 discard
//! counters since Linux 4.18, and by 2 flush counters since Linux 5.5. All
//! counters are monotonic, except for the number of I/Os in progress which
//! is a gauge. Times are in milliseconds.

use crate::clock::ClockTicks;
use crate::delta::{checked_scale, counter_delta, elapsed, match_entities,
                   DeltaComputer, Ratio, PERCENT};
use crate::error::{Error, ParseCause, Partial};
use crate::parser::PseudoFileParser;
use crate::snapshot::Snapshot;
use crate::splitter::{Delimiters, SplitColumns, SplitLines};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use super::parse_counters;


/// Size of a disk sector, as far as /proc/diskstats is concerned (whatever
/// the actual sector size of the underlying hardware)
pub const SECTOR_SIZE: u64 = 512;


/// Parser for /proc/diskstats
#[derive(Debug, Default)]
pub struct DiskStatsParser {
    /// Number of devices in the last parsed sample
    devices: usize,
}
//
impl PseudoFileParser for DiskStatsParser {
    type Data = DiskStats;

    const PATH: &'static str = "diskstats";

    fn parse(&mut self, contents: &[u8], errors: &mut Vec<Error>)
        -> DiskStats
    {
        let mut stats = DiskStats {
            devices: Vec::with_capacity(self.devices),
        };
        for line in SplitLines::new(contents, Delimiters::SPACE) {
            if let Some(device) = DiskDevice::parse(line.columns(), errors) {
                stats.devices.push(device);
            }
        }
        self.devices = stats.devices.len();
        stats
    }
}


/// Contents of /proc/diskstats
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskStats {
    /// Block devices, in file order
    pub devices: Vec<DiskDevice>,
}
//
impl DiskStats {
    /// Look up a device by name
    pub fn device(&self, name: &str) -> Option<&DiskDevice> {
        self.devices.iter().find(|device| device.name == name)
    }
}


/// I/O statistics of one block device
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDevice {
    /// Major device number
    pub major: u32,

    /// Minor device number
    pub minor: u32,

    /// Device name
    pub name: String,

    /// Number of reads completed successfully
    pub reads_completed: u64,

    /// Number of adjacent reads merged together
    pub reads_merged: u64,

    /// Number of sectors read
    pub sectors_read: u64,

    /// Time spent reading (ms)
    pub read_time_ms: u64,

    /// Number of writes completed successfully
    pub writes_completed: u64,

    /// Number of adjacent writes merged together
    pub writes_merged: u64,

    /// Number of sectors written
    pub sectors_written: u64,

    /// Time spent writing (ms)
    pub write_time_ms: u64,

    /// Number of I/Os currently in progress (gauge)
    pub io_in_progress: u64,

    /// Time spent with at least one I/O in progress (ms)
    pub io_time_ms: u64,

    /// Time spent doing I/Os, weighted by the number of I/Os in progress (ms)
    pub weighted_io_time_ms: u64,

    /// Discard statistics (since Linux 4.18)
    pub discards: Option<DiscardStats>,

    /// Flush statistics (since Linux 5.5)
    pub flushes: Option<FlushStats>,
}
//
impl DiskDevice {
    /// Decode a line of /proc/diskstats. Lines which do not even identify a
    /// device are reported and dropped, other problems are reported and the
    /// affected counters are left at zero.
    fn parse(mut columns: SplitColumns, errors: &mut Vec<Error>)
        -> Option<Self>
    {
        // Identify the device
        let major = columns.expect().and_then(|field| field.parse_uint());
        let minor = columns.expect().and_then(|field| field.parse_uint());
        let name = columns.expect().map(|field| field.to_owned_string());
        let (major, minor, name) = match (major, minor, name) {
            (Ok(major), Ok(minor), Ok(name)) => (major, minor, name),
            (major, minor, name) => {
                let cause = [major.err(), minor.err(), name.err()]
                                .into_iter()
                                .flatten()
                                .next()
                                .unwrap_or(ParseCause::MissingField);
                errors.push(Error::parse("diskstats.device", cause));
                return None;
            },
        };
        let mut device = Self { major, minor, name, ..Self::default() };

        // Classic I/O counters, which every kernel provides
        {
            let name = &device.name;
            let mut counters = [
                ("reads_completed", &mut device.reads_completed),
                ("reads_merged", &mut device.reads_merged),
                ("sectors_read", &mut device.sectors_read),
                ("read_time_ms", &mut device.read_time_ms),
                ("writes_completed", &mut device.writes_completed),
                ("writes_merged", &mut device.writes_merged),
                ("sectors_written", &mut device.sectors_written),
                ("write_time_ms", &mut device.write_time_ms),
                ("io_in_progress", &mut device.io_in_progress),
                ("io_time_ms", &mut device.io_time_ms),
                ("weighted_io_time_ms", &mut device.weighted_io_time_ms),
            ];
            if !parse_counters(name, &mut columns, &mut counters, errors) {
                return Some(device);
            }
        }

        // Discard counters, if this kernel has them
        if columns.remaining() == 0 { return Some(device); }
        let mut discards = DiscardStats::default();
        let complete = parse_counters(&device.name, &mut columns, &mut [
            ("discards_completed", &mut discards.completed),
            ("discards_merged", &mut discards.merged),
            ("sectors_discarded", &mut discards.sectors),
            ("discard_time_ms", &mut discards.time_ms),
        ], errors);
        device.discards = Some(discards);
        if !complete { return Some(device); }

        // Flush counters, if this kernel has them
        if columns.remaining() == 0 { return Some(device); }
        let mut flushes = FlushStats::default();
        parse_counters(&device.name, &mut columns, &mut [
            ("flushes_completed", &mut flushes.completed),
            ("flush_time_ms", &mut flushes.time_ms),
        ], errors);
        device.flushes = Some(flushes);
        Some(device)
    }
}


/// Discard statistics of a block device (since Linux 4.18)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardStats {
    /// Number of discards completed successfully
    pub completed: u64,

    /// Number of adjacent discards merged together
    pub merged: u64,

    /// Number of sectors discarded
    pub sectors: u64,

    /// Time spent discarding (ms)
    pub time_ms: u64,
}
//
impl DiscardStats {
    fn delta(device: &str, prior: &Self, current: &Self)
        -> Result<Self, Error>
    {
        let delta = |counter: &str, old, new| {
            counter_delta(&format!("{}.{}", device, counter), old, new)
        };
        Ok(Self {
            completed: delta("discards_completed", prior.completed,
                             current.completed)?,
            merged: delta("discards_merged", prior.merged, current.merged)?,
            sectors: delta("sectors_discarded", prior.sectors,
                           current.sectors)?,
            time_ms: delta("discard_time_ms", prior.time_ms,
                           current.time_ms)?,
        })
    }
}


/// Flush statistics of a block device (since Linux 5.5)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushStats {
    /// Number of flushes completed successfully
    pub completed: u64,

    /// Time spent flushing (ms)
    pub time_ms: u64,
}
//
impl FlushStats {
    fn delta(device: &str, prior: &Self, current: &Self)
        -> Result<Self, Error>
    {
        Ok(Self {
            completed: counter_delta(&format!("{}.flushes_completed", device),
                                     prior.completed, current.completed)?,
            time_ms: counter_delta(&format!("{}.flush_time_ms", device),
                                   prior.time_ms, current.time_ms)?,
        })
    }
}


impl DeltaComputer for DiskStats {
    type Delta = DiskStatsDelta;

    fn delta(prior: &Snapshot<Self>,
             current: &Snapshot<Self>,
             _clock: ClockTicks) -> Result<Partial<DiskStatsDelta>, Error> {
        let time_delta = elapsed(prior, current)?;
        let mut errors = Vec::new();
        let devices = match_entities(&prior.devices, &current.devices,
                                     &mut errors, |old, new| {
            DiskUsage::new(old, new, time_delta)
        })?;
        Ok(Partial::with_errors(DiskStatsDelta { time_delta, devices },
                                errors))
    }
}


/// Block device activity between two snapshots of /proc/diskstats
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiskStatsDelta {
    /// Time elapsed between the two snapshots
    pub time_delta: Duration,

    /// Activity of each device that is present in both snapshots
    pub devices: Vec<DiskUsage>,
}


/// Activity of one block device between two snapshots
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Device name
    pub name: String,

    /// Number of reads completed
    pub reads_completed: u64,

    /// Number of reads merged
    pub reads_merged: u64,

    /// Volume of data read, in bytes
    pub read_bytes: u64,

    /// Time spent reading
    pub read_time: Duration,

    /// Number of writes completed
    pub writes_completed: u64,

    /// Number of writes merged
    pub writes_merged: u64,

    /// Volume of data written, in bytes
    pub written_bytes: u64,

    /// Time spent writing
    pub write_time: Duration,

    /// Number of I/Os in progress at the time of the current snapshot
    pub io_in_progress: u64,

    /// Time spent with at least one I/O in progress
    pub io_time: Duration,

    /// Weighted time spent doing I/Os
    pub weighted_io_time: Duration,

    /// Read throughput, in bytes per second
    pub read_throughput: Ratio,

    /// Write throughput, in bytes per second
    pub write_throughput: Ratio,

    /// Percentage of the elapsed time during which the device was busy
    pub utilization: Ratio,

    /// Discard activity, if both snapshots report it
    pub discards: Option<DiscardStats>,

    /// Flush activity, if both snapshots report it
    pub flushes: Option<FlushStats>,
}
//
impl DiskUsage {
    /// Compare two readouts of the same device, taken `elapsed` apart.
    /// Return None if the devices differ.
    fn new(prior: &DiskDevice, current: &DiskDevice, elapsed: Duration)
        -> Result<Option<Self>, Error>
    {
        if prior.name != current.name { return Ok(None); }
        let name = &current.name;
        let delta = |counter: &str, old, new| {
            counter_delta(&format!("{}.{}", name, counter), old, new)
        };

        // Compute the counter deltas
        let read_bytes = checked_scale(
            &format!("{}.read_bytes", name),
            delta("sectors_read", prior.sectors_read, current.sectors_read)?,
            SECTOR_SIZE
        )?;
        let written_bytes = checked_scale(
            &format!("{}.written_bytes", name),
            delta("sectors_written", prior.sectors_written,
                  current.sectors_written)?,
            SECTOR_SIZE
        )?;
        let io_time_ms = delta("io_time_ms", prior.io_time_ms,
                               current.io_time_ms)?;
        let discards = match (&prior.discards, &current.discards) {
            (Some(old), Some(new)) => Some(DiscardStats::delta(name, old,
                                                               new)?),
            _ => None,
        };
        let flushes = match (&prior.flushes, &current.flushes) {
            (Some(old), Some(new)) => Some(FlushStats::delta(name, old, new)?),
            _ => None,
        };

        Ok(Some(Self {
            name: name.clone(),
            reads_completed: delta("reads_completed", prior.reads_completed,
                                   current.reads_completed)?,
            reads_merged: delta("reads_merged", prior.reads_merged,
                                current.reads_merged)?,
            read_bytes,
            read_time: Duration::from_millis(
                delta("read_time_ms", prior.read_time_ms,
                      current.read_time_ms)?
            ),
            writes_completed: delta("writes_completed",
                                    prior.writes_completed,
                                    current.writes_completed)?,
            writes_merged: delta("writes_merged", prior.writes_merged,
                                 current.writes_merged)?,
            written_bytes,
            write_time: Duration::from_millis(
                delta("write_time_ms", prior.write_time_ms,
                      current.write_time_ms)?
            ),
            io_in_progress: current.io_in_progress,
            io_time: Duration::from_millis(io_time_ms),
            weighted_io_time: Duration::from_millis(
                delta("weighted_io_time_ms", prior.weighted_io_time_ms,
                      current.weighted_io_time_ms)?
            ),
            read_throughput: Ratio::rate(read_bytes, elapsed),
            write_throughput: Ratio::rate(written_bytes, elapsed),
            utilization: Ratio::rate(io_time_ms, elapsed)
                              .scale(PERCENT / 1000.0),
            discards,
            flushes,
        }))
    }
}
