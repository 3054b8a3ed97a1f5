//! This module contains a sampling parser for /proc/meminfo
//!
//! /proc/meminfo is just a (large) set of named data volumes with a few
//! counters sprinkled in the middle:
//!
//! ```text
//! MemTotal:       16326620 kB
//! MemFree:         1972364 kB
//! Active(anon):    4622268 kB
//! HugePages_Total:       0
//! Hugepagesize:       2048 kB
//! ```
//!
//! Volumes are given in KiB, whatever the "kB" suffix says. Everything in
//! there is a gauge. The set of records depends on the kernel version and
//! configuration, so every record is optional.

use bytesize::ByteSize;
use crate::error::{Error, ParseCause};
use crate::parser::PseudoFileParser;
use crate::splitter::{Delimiters, SplitColumns, SplitLines};
use serde::{Deserialize, Serialize};
use tracing::trace;


/// Parser for /proc/meminfo
#[derive(Debug, Default)]
pub struct MemInfoParser;
//
impl PseudoFileParser for MemInfoParser {
    type Data = MemInfo;

    const PATH: &'static str = "meminfo";

    fn parse(&mut self, contents: &[u8], errors: &mut Vec<Error>) -> MemInfo {
        let mut info = MemInfo::default();

        for line in SplitLines::new(contents, Delimiters::COLON) {
            let mut columns = line.columns();
            let key = match columns.next() {
                Some(key) => key,
                None => continue,
            };

            // Find out where the record should go
            let slot = match key.as_bytes() {
                b"MemTotal" => Slot::Volume(&mut info.mem_total),
                b"MemFree" => Slot::Volume(&mut info.mem_free),
                b"MemAvailable" => Slot::Volume(&mut info.mem_available),
                b"Buffers" => Slot::Volume(&mut info.buffers),
                b"Cached" => Slot::Volume(&mut info.cached),
                b"SwapCached" => Slot::Volume(&mut info.swap_cached),
                b"Active" => Slot::Volume(&mut info.active),
                b"Inactive" => Slot::Volume(&mut info.inactive),
                b"Active(anon)" => Slot::Volume(&mut info.active_anon),
                b"Inactive(anon)" => Slot::Volume(&mut info.inactive_anon),
                b"Active(file)" => Slot::Volume(&mut info.active_file),
                b"Inactive(file)" => Slot::Volume(&mut info.inactive_file),
                b"Unevictable" => Slot::Volume(&mut info.unevictable),
                b"Mlocked" => Slot::Volume(&mut info.mlocked),
                b"SwapTotal" => Slot::Volume(&mut info.swap_total),
                b"SwapFree" => Slot::Volume(&mut info.swap_free),
                b"Dirty" => Slot::Volume(&mut info.dirty),
                b"Writeback" => Slot::Volume(&mut info.writeback),
                b"AnonPages" => Slot::Volume(&mut info.anon_pages),
                b"Mapped" => Slot::Volume(&mut info.mapped),
                b"Shmem" => Slot::Volume(&mut info.shmem),
                b"Slab" => Slot::Volume(&mut info.slab),
                b"SReclaimable" => Slot::Volume(&mut info.slab_reclaimable),
                b"SUnreclaim" => Slot::Volume(&mut info.slab_unreclaimable),
                b"KernelStack" => Slot::Volume(&mut info.kernel_stack),
                b"PageTables" => Slot::Volume(&mut info.page_tables),
                b"CommitLimit" => Slot::Volume(&mut info.commit_limit),
                b"Committed_AS" => Slot::Volume(&mut info.committed_as),
                b"VmallocTotal" => Slot::Volume(&mut info.vmalloc_total),
                b"VmallocUsed" => Slot::Volume(&mut info.vmalloc_used),
                b"HugePages_Total" => Slot::Count(&mut info.huge_pages_total),
                b"HugePages_Free" => Slot::Count(&mut info.huge_pages_free),
                b"HugePages_Rsvd" => Slot::Count(&mut info.huge_pages_reserved),
                b"HugePages_Surp" => Slot::Count(&mut info.huge_pages_surplus),
                b"Hugepagesize" => Slot::Volume(&mut info.huge_page_size),
                other => {
                    trace!(key = %String::from_utf8_lossy(other),
                           "skipping unknown /proc/meminfo record");
                    continue;
                },
            };

            // Decode it
            let result = match slot {
                Slot::Volume(target) => {
                    parse_volume(columns).map(|volume| *target = Some(volume))
                },
                Slot::Count(target) => {
                    parse_count(columns).map(|count| *target = Some(count))
                },
            };
            if let Err(cause) = result {
                errors.push(Error::parse(key.to_owned_string(), cause));
            }
        }
        info
    }
}


/// INTERNAL: Where a /proc/meminfo record goes
enum Slot<'a> {
    /// A volume of data
    Volume(&'a mut Option<ByteSize>),

    /// A raw counter of something (e.g. free huge pages)
    Count(&'a mut Option<u64>),
}

/// INTERNAL: Decode a data volume record, key excluded
fn parse_volume(mut columns: SplitColumns) -> Result<ByteSize, ParseCause> {
    let amount = columns.expect()?.parse_u64()?;
    match columns.next() {
        // It's a volume of data (in KiB, don't trust the kernel's units...)
        Some(unit) if unit.as_bytes() == b"kB" => {
            amount.checked_mul(1024)
                  .map(ByteSize::b)
                  .ok_or(ParseCause::Overflow)
        },
        Some(unit) => Err(ParseCause::Unexpected(unit.to_owned_string())),
        None => Ok(ByteSize::b(amount)),
    }
}

/// INTERNAL: Decode a counter record, key excluded
fn parse_count(mut columns: SplitColumns) -> Result<u64, ParseCause> {
    let count = columns.expect()?.parse_u64()?;
    match columns.next() {
        Some(unit) => Err(ParseCause::Unexpected(unit.to_owned_string())),
        None => Ok(count),
    }
}


/// Contents of /proc/meminfo
///
/// Records which the kernel did not provide are None. See the kernel's
/// Documentation/filesystems/proc.rst for the meaning of each record.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemInfo {
    /// Usable RAM (physical RAM minus reserved bits and the kernel code)
    #[serde(with = "crate::procfs::opt_volume")]
    pub mem_total: Option<ByteSize>,

    /// RAM which is not used at all
    #[serde(with = "crate::procfs::opt_volume")]
    pub mem_free: Option<ByteSize>,

    /// Estimate of how much memory is available for starting new
    /// applications without swapping (since Linux 3.14)
    #[serde(with = "crate::procfs::opt_volume")]
    pub mem_available: Option<ByteSize>,

    /// Temporary storage for raw disk blocks
    #[serde(with = "crate::procfs::opt_volume")]
    pub buffers: Option<ByteSize>,

    /// In-memory cache for files read from the disk (the page cache)
    #[serde(with = "crate::procfs::opt_volume")]
    pub cached: Option<ByteSize>,

    /// Memory that was swapped out, then back in, and is still in the swap
    #[serde(with = "crate::procfs::opt_volume")]
    pub swap_cached: Option<ByteSize>,

    /// Memory that has been used recently
    #[serde(with = "crate::procfs::opt_volume")]
    pub active: Option<ByteSize>,

    /// Memory which has been less recently used
    #[serde(with = "crate::procfs::opt_volume")]
    pub inactive: Option<ByteSize>,

    #[serde(with = "crate::procfs::opt_volume")]
    pub active_anon: Option<ByteSize>,

    #[serde(with = "crate::procfs::opt_volume")]
    pub inactive_anon: Option<ByteSize>,

    #[serde(with = "crate::procfs::opt_volume")]
    pub active_file: Option<ByteSize>,

    #[serde(with = "crate::procfs::opt_volume")]
    pub inactive_file: Option<ByteSize>,

    #[serde(with = "crate::procfs::opt_volume")]
    pub unevictable: Option<ByteSize>,

    /// Memory locked with mlock()
    #[serde(with = "crate::procfs::opt_volume")]
    pub mlocked: Option<ByteSize>,

    /// Total amount of swap space
    #[serde(with = "crate::procfs::opt_volume")]
    pub swap_total: Option<ByteSize>,

    /// Swap space which is not used
    #[serde(with = "crate::procfs::opt_volume")]
    pub swap_free: Option<ByteSize>,

    /// Memory waiting to be written back to the disk
    #[serde(with = "crate::procfs::opt_volume")]
    pub dirty: Option<ByteSize>,

    /// Memory being written back to the disk
    #[serde(with = "crate::procfs::opt_volume")]
    pub writeback: Option<ByteSize>,

    /// Non-file backed pages mapped into user-space page tables
    #[serde(with = "crate::procfs::opt_volume")]
    pub anon_pages: Option<ByteSize>,

    /// Files which have been mapped into memory (with mmap)
    #[serde(with = "crate::procfs::opt_volume")]
    pub mapped: Option<ByteSize>,

    /// Amount of memory consumed by tmpfs filesystems
    #[serde(with = "crate::procfs::opt_volume")]
    pub shmem: Option<ByteSize>,

    /// In-kernel data structures cache
    #[serde(with = "crate::procfs::opt_volume")]
    pub slab: Option<ByteSize>,

    /// Part of the slab that might be reclaimed, such as caches
    #[serde(with = "crate::procfs::opt_volume")]
    pub slab_reclaimable: Option<ByteSize>,

    /// Part of the slab that cannot be reclaimed under memory pressure
    #[serde(with = "crate::procfs::opt_volume")]
    pub slab_unreclaimable: Option<ByteSize>,

    /// Memory used by kernel stacks
    #[serde(with = "crate::procfs::opt_volume")]
    pub kernel_stack: Option<ByteSize>,

    /// Memory dedicated to the lowest level of page tables
    #[serde(with = "crate::procfs::opt_volume")]
    pub page_tables: Option<ByteSize>,

    /// Total amount of memory which can be allocated under the current
    /// overcommit policy
    #[serde(with = "crate::procfs::opt_volume")]
    pub commit_limit: Option<ByteSize>,

    /// Amount of memory presently allocated on the system
    #[serde(with = "crate::procfs::opt_volume")]
    pub committed_as: Option<ByteSize>,

    /// Total size of the vmalloc memory area
    #[serde(with = "crate::procfs::opt_volume")]
    pub vmalloc_total: Option<ByteSize>,

    /// Amount of the vmalloc area which is used
    #[serde(with = "crate::procfs::opt_volume")]
    pub vmalloc_used: Option<ByteSize>,

    /// Size of the pool of huge pages
    pub huge_pages_total: Option<u64>,

    /// Number of huge pages in the pool that are not yet allocated
    pub huge_pages_free: Option<u64>,

    /// Number of huge pages which were promised, but not allocated yet
    pub huge_pages_reserved: Option<u64>,

    /// Number of huge pages above the size of the pool
    pub huge_pages_surplus: Option<u64>,

    /// Size of one huge page
    #[serde(with = "crate::procfs::opt_volume")]
    pub huge_page_size: Option<ByteSize>,
}
//
impl MemInfo {
    /// Memory used by applications, i.e. neither free nor used as a cache
    ///
    /// None if the kernel did not report the total or free memory.
    ///
    pub fn used(&self) -> Option<ByteSize> {
        let total = self.mem_total?.as_u64();
        let free = self.mem_free?.as_u64();
        let buffers = self.buffers.map_or(0, |b| b.as_u64());
        let cached = self.cached.map_or(0, |c| c.as_u64());
        Some(ByteSize::b(total.saturating_sub(free)
                              .saturating_sub(buffers)
                              .saturating_sub(cached)))
    }

    /// Swap space which is in use
    pub fn swap_used(&self) -> Option<ByteSize> {
        let total = self.swap_total?.as_u64();
        let free = self.swap_free?.as_u64();
        Some(ByteSize::b(total.saturating_sub(free)))
    }
}
