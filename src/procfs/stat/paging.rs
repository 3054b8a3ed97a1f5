//! This module contains facilities for parsing and storing the data contained
//! in the paging statistics of /proc/stat (page and swap).
//!
//! These records disappeared from /proc/stat in Linux 2.6, in favor of
//! /proc/vmstat, but older kernels still emit them.

use crate::delta::counter_delta;
use crate::error::Error;
use crate::splitter::SplitColumns;
use serde::{Deserialize, Serialize};


/// Paging activity counters from /proc/stat
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    /// Number of memory pages that were brought in from disk
    pub incoming: u64,

    /// Number of memory pages that were sent out to disk
    pub outgoing: u64,
}
//
impl Paging {
    /// Decode a "page" or "swap" record, whose key (`name`) is already
    /// consumed
    pub(super) fn parse(name: &str,
                        mut columns: SplitColumns,
                        errors: &mut Vec<Error>) -> Self {
        let mut paging = Self::default();
        for (direction, counter) in [("in", &mut paging.incoming),
                                     ("out", &mut paging.outgoing)] {
            match columns.expect().and_then(|field| field.parse_u64()) {
                Ok(pages) => *counter = pages,
                Err(cause) => {
                    errors.push(Error::parse(format!("{}.{}", name, direction),
                                             cause));
                },
            }
        }
        paging
    }

    /// Count the pages which moved between two snapshots
    pub(super) fn delta(name: &str, prior: &Self, current: &Self)
        -> Result<Self, Error>
    {
        Ok(Self {
            incoming: counter_delta(&format!("{}.in", name),
                                    prior.incoming, current.incoming)?,
            outgoing: counter_delta(&format!("{}.out", name),
                                    prior.outgoing, current.outgoing)?,
        })
    }
}
