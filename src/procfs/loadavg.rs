//! This module contains a sampling parser for /proc/loadavg
//!
//! The file is a single line:
//!
//! ```text
//! 0.52 0.58 0.59 1/467 12345
//! ```
//!
//! That is, the load averages over 1, 5 and 15 minutes, the number of
//! runnable scheduling entities over the total number of them, and the PID
//! of the most recently created process. These are all gauges.

use crate::error::{Error, ParseCause};
use crate::parser::{parse_into, PseudoFileParser};
use crate::splitter::{Delimiters, Field, SplitColumns, SplitLines};
use serde::{Deserialize, Serialize};


/// Parser for /proc/loadavg
#[derive(Debug, Default)]
pub struct LoadAvgParser;
//
impl PseudoFileParser for LoadAvgParser {
    type Data = LoadAvg;

    const PATH: &'static str = "loadavg";

    fn parse(&mut self, contents: &[u8], errors: &mut Vec<Error>) -> LoadAvg {
        let mut load = LoadAvg::default();
        if let Err(error) = parse_fields(contents, &mut load, errors) {
            errors.push(error);
        }
        load
    }
}


/// INTERNAL: Decode the fields of /proc/loadavg in order. Broken fields are
///           reported in `errors`, a truncated file ends the parse with an
///           error which the caller reports.
fn parse_fields(contents: &[u8],
                load: &mut LoadAvg,
                errors: &mut Vec<Error>) -> Result<(), Error> {
    let mut columns = SplitLines::new(contents, Delimiters::SLASH)
                                 .next()
                                 .map(|line| line.columns())
                                 .ok_or_else(|| {
                                     Error::parse("loadavg",
                                                  ParseCause::MissingField)
                                 })?;

    // Load averages
    for (name, target) in [("loadavg.one", &mut load.one),
                           ("loadavg.five", &mut load.five),
                           ("loadavg.fifteen", &mut load.fifteen)] {
        let field = expect(&mut columns, name)?;
        parse_into(target, name, field.parse_decimal().map(|d| d.to_f64()),
                   errors);
    }

    // Scheduling entities
    for (name, target) in [("loadavg.runnable", &mut load.runnable),
                           ("loadavg.total", &mut load.total)] {
        let field = expect(&mut columns, name)?;
        parse_into(target, name, field.parse_u64(), errors);
    }

    // Last PID
    let field = expect(&mut columns, "loadavg.last_pid")?;
    parse_into(&mut load.last_pid, "loadavg.last_pid", field.parse_uint(),
               errors);
    Ok(())
}

/// INTERNAL: Fetch the next field, which must be there
fn expect<'a>(columns: &mut SplitColumns<'a>, name: &str)
    -> Result<Field<'a>, Error>
{
    columns.expect().map_err(|cause| Error::parse(name, cause))
}


/// Contents of /proc/loadavg
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAvg {
    /// Average number of runnable (or uninterruptible) tasks over 1 minute
    pub one: f64,

    /// Same over 5 minutes
    pub five: f64,

    /// Same over 15 minutes
    pub fifteen: f64,

    /// Number of currently runnable scheduling entities
    pub runnable: u64,

    /// Number of scheduling entities that currently exist
    pub total: u64,

    /// PID of the most recently created process
    pub last_pid: u32,
}
//
impl LoadAvg {
    /// Load averages (1, 5 and 15 minutes) normalized by the number of CPUs,
    /// so that 1.0 means that every CPU was busy
    pub fn per_cpu(&self, cpus: usize) -> Option<[f64; 3]> {
        if cpus == 0 { return None; }
        let cpus = cpus as f64;
        Some([self.one / cpus, self.five / cpus, self.fifteen / cpus])
    }
}




/// Performance benchmarks
#[cfg(test)]
mod benchmarks {
    use crate::parser::PseudoFileParser;
    use crate::reader::ProcFileReader;
    use super::LoadAvgParser;

    /// Benchmark for the full loadavg sampling overhead
    #[test]
    #[ignore]
    fn sampling_overhead() {
        let mut reader = ProcFileReader::open("/proc/loadavg").unwrap();
        let mut errors = Vec::new();
        testbench::benchmark(1_000_000, || {
            errors.clear();
            reader.sample(|contents| LoadAvgParser.parse(contents, &mut errors))
                  .unwrap();
        });
    }
}
