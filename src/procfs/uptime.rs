//! This module contains a sampling parser for /proc/uptime
//!
//! The file contains the time elapsed since boot and the cumulative time
//! that all CPUs spent idle, both in seconds with a fractional part:
//!
//! ```text
//! 13.52 50.34
//! ```
//!
//! Both are monotonic counters. The idle time may exceed the uptime on
//! multi-core systems.

use crate::clock::ClockTicks;
use crate::delta::{elapsed, DeltaComputer, Ratio};
use crate::error::{Error, ParseCause, Partial};
use crate::parser::{parse_into, PseudoFileParser};
use crate::snapshot::Snapshot;
use crate::splitter::{Delimiters, SplitLines};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use super::parse_duration_secs;


/// Parser for /proc/uptime
#[derive(Debug, Default)]
pub struct UptimeParser;
//
impl PseudoFileParser for UptimeParser {
    type Data = Uptime;

    const PATH: &'static str = "uptime";

    fn parse(&mut self, contents: &[u8], errors: &mut Vec<Error>) -> Uptime {
        let mut uptime = Uptime::default();
        let mut columns = match SplitLines::new(contents, Delimiters::SPACE)
                                           .next() {
            Some(line) => line.columns(),
            None => {
                errors.push(Error::parse("uptime", ParseCause::MissingField));
                return uptime;
            },
        };

        // Load machine uptime and idle time
        parse_into(&mut uptime.uptime, "uptime",
                   columns.expect().and_then(|f| parse_duration_secs(&f)),
                   errors);
        parse_into(&mut uptime.idle, "uptime.idle",
                   columns.expect().and_then(|f| parse_duration_secs(&f)),
                   errors);
        uptime
    }
}


/// Contents of /proc/uptime
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uptime {
    /// Elapsed wall clock time since the system was started
    pub uptime: Duration,

    /// Cumulative amount of time spent by all CPUs in the idle state
    pub idle: Duration,
}
//
impl Uptime {
    /// Fraction of the available CPU time which was spent idle since boot,
    /// given the number of CPUs
    pub fn idle_fraction(&self, cpus: usize) -> Ratio {
        let available = self.uptime.as_secs_f64() * cpus as f64;
        if available == 0.0 {
            Ratio::Indeterminate
        } else {
            Ratio::Value(self.idle.as_secs_f64() / available)
        }
    }
}
//
impl DeltaComputer for Uptime {
    type Delta = UptimeDelta;

    fn delta(prior: &Snapshot<Self>,
             current: &Snapshot<Self>,
             _clock: ClockTicks) -> Result<Partial<UptimeDelta>, Error> {
        Ok(Partial::complete(UptimeDelta {
            time_delta: elapsed(prior, current)?,
            uptime: duration_delta("uptime", prior.uptime, current.uptime)?,
            idle: duration_delta("uptime.idle", prior.idle, current.idle)?,
        }))
    }
}


/// Evolution of /proc/uptime between two snapshots
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeDelta {
    /// Wall-clock time elapsed between the two snapshots
    pub time_delta: Duration,

    /// Uptime elapsed between the two snapshots, which should match the
    /// wall-clock time unless the system was suspended or the clock stepped
    pub uptime: Duration,

    /// Cumulative CPU idle time between the two snapshots
    pub idle: Duration,
}


/// INTERNAL: Difference between two readouts of a monotonic time counter
fn duration_delta(field: &str, prior: Duration, current: Duration)
    -> Result<Duration, Error>
{
    // Nanosecond counts fit in 64 bits for the next five centuries
    current.checked_sub(prior).ok_or_else(|| Error::CounterRegression {
        field: field.to_owned(),
        prior: prior.as_nanos() as u64,
        current: current.as_nanos() as u64,
    })
}


/// Unit tests
#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use crate::clock::ClockTicks;
    use crate::delta::{DeltaComputer, Ratio};
    use crate::error::{Error, ParseCause};
    use crate::parser::PseudoFileParser;
    use crate::snapshot::Snapshot;
    use std::time::Duration;
    use super::{Uptime, UptimeParser};

    /// INTERNAL: Parse some /proc/uptime contents
    fn parse(input: &str) -> (Uptime, Vec<Error>) {
        let mut errors = Vec::new();
        let uptime = UptimeParser.parse(input.as_bytes(), &mut errors);
        (uptime, errors)
    }

    /// Check that uptime is parsed correctly
    #[test]
    fn parse_uptime() {
        let (uptime, errors) = parse("13.52 50.34\n");
        assert!(errors.is_empty());
        assert_eq!(uptime.uptime, Duration::from_millis(13520));
        assert_eq!(uptime.idle, Duration::from_millis(50340));
        assert_eq!(Uptime::default().idle_fraction(4), Ratio::Indeterminate);

        let (uptime, _) = parse("10.00 30.00\n");
        assert_eq!(uptime.idle_fraction(4), Ratio::Value(0.75));
    }

    /// Check that broken fields are reported
    #[test]
    fn malformed_uptime() {
        let (uptime, errors) = parse("13.5z 50.34\n");
        assert_eq!(uptime.uptime, Duration::ZERO);
        assert_eq!(uptime.idle, Duration::from_millis(50340));
        assert!(matches!(&errors[..], [Error::Parse {
            cause: ParseCause::MalformedNumber { byte: b'z', position: 4 }, ..
        }]));

        let (_, errors) = parse("13.52\n");
        assert!(matches!(&errors[..], [Error::Parse {
            cause: ParseCause::MissingField, ..
        }]));
    }

    /// Check that uptime deltas are computed correctly
    #[test]
    fn uptime_delta() {
        let at = |secs: i64| {
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
        };
        let prior = Snapshot::new(at(0), parse("100.00 350.00").0);
        let current = Snapshot::new(at(2), parse("102.01 357.50").0);
        let delta = Uptime::delta(&prior, &current, ClockTicks::from_hz(100))
                           .unwrap()
                           .into_result()
                           .unwrap();
        assert_eq!(delta.time_delta, Duration::from_secs(2));
        assert_eq!(delta.uptime, Duration::from_millis(2010));
        assert_eq!(delta.idle, Duration::from_millis(7500));

        // Uptime cannot go backwards
        assert!(matches!(Uptime::delta(&current,
                                       &Snapshot::new(at(3), prior.data),
                                       ClockTicks::from_hz(100)),
                         Err(Error::CounterRegression { .. })));
    }
}
