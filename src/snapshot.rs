//! Timestamped pseudo-file samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;


/// One fully parsed, timestamped read of a pseudo-file
///
/// The timestamp is the wall-clock time at which the readout began, not the
/// time at which parsing finished, so that elapsed-time computations reflect
/// acquisition time rather than the CPU time spent parsing.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    /// When the readout began
    pub timestamp: DateTime<Utc>,

    /// Parsed contents of the pseudo-file
    pub data: T,
}
//
impl<T> Snapshot<T> {
    /// Build a snapshot from its parts
    pub fn new(timestamp: DateTime<Utc>, data: T) -> Self {
        Self { timestamp, data }
    }

    /// Transform the payload, keeping the timestamp
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Snapshot<U> {
        Snapshot { timestamp: self.timestamp, data: f(self.data) }
    }
}
//
impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}
