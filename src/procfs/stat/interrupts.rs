//! This module contains facilities for parsing and storing the data contained
//! in the IRQ statistics of /proc/stat (intr and softirq).

use crate::delta::{counter_delta, match_entities};
use crate::error::Error;
use crate::splitter::SplitColumns;
use serde::{Deserialize, Serialize};


/// Interrupt statistics from /proc/stat (monotonic counters)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupts {
    /// Total number of interrupts that were serviced. May be higher than the
    /// sum of the breakdown below if there are unnumbered interrupt sources.
    pub total: u64,

    /// Breakdown of the interrupt count per numbered interrupt source.
    /// Beware that not all interrupt sources are numbered by the Linux kernel.
    pub details: Vec<u64>,
}
//
impl Interrupts {
    /// Decode an "intr" or "softirq" record, whose key (`name`) is already
    /// consumed. Broken counters are reported and left at zero.
    pub(super) fn parse(name: &str,
                        mut columns: SplitColumns,
                        errors: &mut Vec<Error>) -> Self {
        let mut interrupts = Self::default();

        // Load the total interrupt count
        match columns.expect().and_then(|field| field.parse_u64()) {
            Ok(total) => interrupts.total = total,
            Err(cause) => errors.push(Error::parse(name, cause)),
        }

        // Load the detailed interrupt counts from each source
        interrupts.details.reserve(columns.remaining());
        for (index, field) in columns.enumerate() {
            match field.parse_u64() {
                Ok(count) => interrupts.details.push(count),
                Err(cause) => {
                    errors.push(Error::parse(format!("{}.{}", name, index),
                                             cause));
                    interrupts.details.push(0);
                },
            }
        }
        interrupts
    }

    /// Count the interrupts which occured between two snapshots. If the set
    /// of numbered sources changed, only the common ones are compared.
    pub(super) fn delta(name: &str,
                        prior: &Self,
                        current: &Self,
                        errors: &mut Vec<Error>) -> Result<Self, Error> {
        let total = counter_delta(name, prior.total, current.total)?;
        let mut index = 0;
        let details = match_entities(&prior.details, &current.details, errors,
                                     |&old, &new| {
            let result = counter_delta(&format!("{}.{}", name, index),
                                       old, new);
            index += 1;
            result.map(Some)
        })?;
        Ok(Self { total, details })
    }
}
