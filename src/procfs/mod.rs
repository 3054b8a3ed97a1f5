//! This module contains parsers for the contents of procfs.
//!
//! Most parsers are designed to allow sampling the contents of /proc files at
//! a rapid rate, for the purpose of acquiring, analyzing and displaying useful
//! statistics on the time evolution of system performance.
//!
//! Each submodule corresponds to one file in /proc, and is named as close to
//! that file as allowed by the Rust module system. Its documentation states
//! the grammar of the file, and which of its numbers are monotonic counters
//! (only meaningful when compared across snapshots) and which are gauges.

pub mod diskstats;
pub mod loadavg;
pub mod meminfo;
pub mod net_dev;
pub mod stat;
pub mod uptime;
pub mod version;

use crate::error::{Error, ParseCause};
use crate::splitter::{Field, SplitColumns};
use std::time::Duration;


/// Decode an amount of seconds in XXXX[.[YY]] format into a Duration
pub fn parse_duration_secs(field: &Field) -> Result<Duration, ParseCause> {
    field.parse_decimal().map(|decimal| decimal.to_duration())
}


/// Decode a sequence of counters of some entity (device, interface...), in
/// order. Broken counters are reported as "<entity>.<counter>" and left at
/// zero. A truncated line is reported once, and false is returned.
pub fn parse_counters(entity: &str,
                      columns: &mut SplitColumns,
                      counters: &mut [(&str, &mut u64)],
                      errors: &mut Vec<Error>) -> bool {
    for (counter, target) in counters.iter_mut() {
        match columns.expect().and_then(|field| field.parse_u64()) {
            Ok(value) => **target = value,
            Err(cause) => {
                let truncated = cause == ParseCause::MissingField;
                errors.push(Error::parse(format!("{}.{}", entity, counter),
                                         cause));
                if truncated { return false; }
            },
        }
    }
    true
}


/// INTERNAL: serde representation of optional byte volumes as plain byte
///           counts, which every format can carry without loss
pub(crate) mod opt_volume {
    use bytesize::ByteSize;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(volume: &Option<ByteSize>,
                                    serializer: S) -> Result<S::Ok, S::Error>
    {
        volume.map(|v| v.as_u64()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D)
        -> Result<Option<ByteSize>, D::Error>
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(ByteSize::b))
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::error::{Error, ParseCause};
    use crate::splitter::{split_line, Delimiters};
    use std::time::Duration;
    use super::{parse_counters, parse_duration_secs};

    /// Check that durations in seconds are decoded correctly
    #[test]
    fn duration_secs() {
        let mut fields = split_line(b"13.52 2 0.000000001 4.x", Delimiters::SPACE);
        let mut next = || parse_duration_secs(&fields.next().unwrap());
        assert_eq!(next(), Ok(Duration::from_millis(13520)));
        assert_eq!(next(), Ok(Duration::from_secs(2)));
        assert_eq!(next(), Ok(Duration::new(0, 1)));
        assert_eq!(next(),
                   Err(ParseCause::MalformedNumber { byte: b'x', position: 2 }));
    }

    /// Check that counter sequences are decoded in order, and that broken
    /// or missing counters are reported under the entity's name
    #[test]
    fn counter_sequences() {
        let (mut a, mut b, mut c) = (9, 9, 9);
        let mut errors = Vec::new();
        let mut columns = split_line(b"1 2y 3", Delimiters::SPACE);
        assert!(parse_counters("eth0", &mut columns,
                               &mut [("a", &mut a), ("b", &mut b),
                                     ("c", &mut c)],
                               &mut errors));
        assert_eq!((a, b, c), (1, 9, 3));
        match &errors[..] {
            [Error::Parse { field, .. }] => assert_eq!(field, "eth0.b"),
            other => panic!("Unexpected errors {:?}", other),
        }

        errors.clear();
        let mut columns = split_line(b"4", Delimiters::SPACE);
        assert!(!parse_counters("sda", &mut columns,
                                &mut [("a", &mut a), ("b", &mut b),
                                      ("c", &mut c)],
                                &mut errors));
        assert_eq!(a, 4);
        match &errors[..] {
            [Error::Parse { field, cause: ParseCause::MissingField }] => {
                assert_eq!(field, "sda.b");
            },
            other => panic!("Unexpected errors {:?}", other),
        }
    }
}
