//! On-demand acquisition of pseudo-file snapshots
//!
//! A snapshotter binds a reader to the parser of the associated pseudo-file:
//! every call to get() resets the reader, reads the file in one go, parses it
//! and timestamps the result. It is synchronous and blocking, which is fine
//! since pseudo-files are generated on the host CPU.

use chrono::{DateTime, Utc};
use crate::clock::ClockTicks;
use crate::delta::DeltaComputer;
use crate::error::{Error, Partial};
use crate::parser::PseudoFileParser;
use crate::reader::ProcFileReader;
use crate::snapshot::Snapshot;
use std::path::Path;
use tracing::trace;


/// Mechanism for acquiring snapshots of a pseudo-file
pub struct Snapshotter<P: PseudoFileParser> {
    /// Reader object for the pseudo-file
    reader: ProcFileReader,

    /// Parser for the contents of the pseudo-file
    parser: P,

    /// Conversion factor for tick-based counters, used by deltas
    clock: ClockTicks,

    /// Timestamp of the last snapshot, used to keep timestamps monotonic
    last_timestamp: Option<DateTime<Utc>>,
}
//
impl<P: PseudoFileParser> Snapshotter<P> {
    /// Open the pseudo-file at its usual location below some procfs root
    pub fn new<R: AsRef<Path>>(proc_root: R, clock: ClockTicks)
        -> Result<Self, Error>
    {
        Self::open(proc_root.as_ref().join(P::PATH), clock)
    }

    /// Open a pseudo-file at an arbitrary location
    pub fn open<F: AsRef<Path>>(path: F, clock: ClockTicks)
        -> Result<Self, Error>
    {
        Ok(Self {
            reader: ProcFileReader::open(path)?,
            parser: P::default(),
            clock,
            last_timestamp: None,
        })
    }

    /// Location of the pseudo-file being sampled
    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    /// Tick conversion factor used for delta computations
    pub fn clock(&self) -> ClockTicks {
        self.clock
    }

    /// Acquire a new snapshot of the pseudo-file
    ///
    /// I/O errors are returned as errors. Parse errors are returned alongside
    /// a snapshot where the affected fields are left at their zero value.
    ///
    pub fn get(&mut self) -> Result<Partial<Snapshot<P::Data>>, Error> {
        // The timestamp is taken when the readout begins. Wall clocks can
        // step backwards, but our timestamps must not.
        let mut timestamp = Utc::now();
        if let Some(last) = self.last_timestamp {
            if timestamp < last { timestamp = last; }
        }

        // Read and parse the file
        let parser = &mut self.parser;
        let mut errors = Vec::new();
        let data = self.reader.sample(|contents| {
            parser.parse(contents, &mut errors)
        })?;
        self.last_timestamp = Some(timestamp);
        trace!(path = %self.reader.path().display(),
               errors = errors.len(),
               "acquired snapshot");

        Ok(Partial::with_errors(Snapshot::new(timestamp, data), errors))
    }

    /// Acquire a new snapshot and compare it with a prior one
    ///
    /// Parse errors from the new snapshot come first in the error list,
    /// followed by those of the comparison.
    ///
    pub fn delta(&mut self, prior: &Snapshot<P::Data>)
        -> Result<Partial<<P::Data as DeltaComputer>::Delta>, Error>
        where P::Data: DeltaComputer
    {
        let Partial { value: current, mut errors } = self.get()?;
        let delta = P::Data::delta(prior, &current, self.clock)?;
        errors.extend(delta.errors);
        Ok(Partial::with_errors(delta.value, errors))
    }
}
