//! Entry point of the library
//!
//! A profiler knows where procfs is mounted and how to sample it, and hands
//! out snapshotters and samplers for individual pseudo-files. There may be
//! as many profilers as needed (e.g. one per proc root in tests), the only
//! state which they share is the system's clock tick rate.

use crate::clock::ClockTicks;
use crate::config::Config;
use crate::delta::DeltaComputer;
use crate::error::Error;
use crate::parser::PseudoFileParser;
use crate::procfs::diskstats::DiskStatsParser;
use crate::procfs::loadavg::LoadAvgParser;
use crate::procfs::meminfo::MemInfoParser;
use crate::procfs::net_dev::NetDevParser;
use crate::procfs::stat::StatParser;
use crate::procfs::uptime::UptimeParser;
use crate::procfs::version::VersionParser;
use crate::sampler::Sampler;
use crate::snapshot::Snapshot;
use crate::snapshotter::Snapshotter;
use tracing::debug;


/// Factory of snapshotters and samplers for some procfs mount
#[derive(Clone, Debug)]
pub struct Profiler {
    /// Configuration shared by everything this profiler builds
    config: Config,

    /// Tick rate used to interpret CPU time counters
    clock: ClockTicks,
}
//
impl Profiler {
    /// Set up a profiler for the host system
    pub fn new(config: Config) -> Result<Self, Error> {
        Self::with_clock_ticks(config, ClockTicks::resolve())
    }

    /// Set up a profiler with a known tick rate, e.g. to analyze the procfs
    /// of another system which was dumped to disk
    pub fn with_clock_ticks(config: Config, clock: ClockTicks)
        -> Result<Self, Error>
    {
        config.validate()?;
        debug!(proc_root = %config.proc_root.display(),
               ticks = clock.per_second(),
               "set up profiler");
        Ok(Self { config, clock })
    }

    /// Configuration of this profiler
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tick rate of the system being profiled
    pub fn clock_ticks(&self) -> ClockTicks {
        self.clock
    }

    /// On-demand access to some pseudo-file
    pub fn snapshotter<P: PseudoFileParser>(&self)
        -> Result<Snapshotter<P>, Error>
    {
        Snapshotter::new(&self.config.proc_root, self.clock)
    }

    /// Periodic sampling of raw snapshots of some pseudo-file
    pub fn sampler_snapshots<P: PseudoFileParser>(&self)
        -> Result<Sampler<Snapshot<P::Data>>, Error>
    {
        Sampler::snapshots(self.snapshotter::<P>()?, &self.config)
    }

    /// Periodic sampling of deltas between snapshots of some pseudo-file
    pub fn sampler_deltas<P>(&self)
        -> Result<Sampler<<P::Data as DeltaComputer>::Delta>, Error>
        where P: PseudoFileParser,
              P::Data: DeltaComputer,
              <P::Data as DeltaComputer>::Delta: Send + 'static
    {
        Sampler::deltas(self.snapshotter::<P>()?, &self.config)
    }

    /// Kernel and CPU activity statistics (/proc/stat)
    pub fn stat(&self) -> Result<Snapshotter<StatParser>, Error> {
        self.snapshotter()
    }

    /// Memory usage (/proc/meminfo)
    pub fn meminfo(&self) -> Result<Snapshotter<MemInfoParser>, Error> {
        self.snapshotter()
    }

    /// Block device activity (/proc/diskstats)
    pub fn diskstats(&self) -> Result<Snapshotter<DiskStatsParser>, Error> {
        self.snapshotter()
    }

    /// Network interface activity (/proc/net/dev)
    pub fn net_dev(&self) -> Result<Snapshotter<NetDevParser>, Error> {
        self.snapshotter()
    }

    /// System load averages (/proc/loadavg)
    pub fn loadavg(&self) -> Result<Snapshotter<LoadAvgParser>, Error> {
        self.snapshotter()
    }

    /// System uptime (/proc/uptime)
    pub fn uptime(&self) -> Result<Snapshotter<UptimeParser>, Error> {
        self.snapshotter()
    }

    /// Kernel version (/proc/version)
    pub fn version(&self) -> Result<Snapshotter<VersionParser>, Error> {
        self.snapshotter()
    }
}
