//! Rate-based metrics derived from pairs of snapshots
//!
//! Most of what procfs exposes are monotonic counters, which only become
//! meaningful when two samples of them are compared. This module defines the
//! interface of such comparisons and the arithmetic building blocks which
//! they share across pseudo-files.

use crate::clock::ClockTicks;
use crate::error::{Error, ParseCause, Partial};
use crate::snapshot::Snapshot;
use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Serialize};
use std::time::Duration;


/// Scale factor turning a fraction into a percentage
pub const PERCENT: f64 = 100.0;


/// Pseudo-file data which can be compared across two snapshots
pub trait DeltaComputer: Sized {
    /// What the comparison yields
    type Delta;

    /// Compare a prior snapshot with a current one
    ///
    /// Hard errors (snapshots out of order, counters going backwards) reject
    /// the comparison as a whole. Soft errors (entity set changes) come with
    /// a partial delta covering what could be compared.
    ///
    fn delta(prior: &Snapshot<Self>,
             current: &Snapshot<Self>,
             clock: ClockTicks) -> Result<Partial<Self::Delta>, Error>;
}


/// A ratio which may not be computable
///
/// Ratios against a zero elapsed time have no meaning. Rather than letting
/// NaN or infinity loose, they are explicitly marked as unavailable.
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Ratio {
    /// A finite value
    Value(f64),

    /// No value, because no time elapsed between the two snapshots
    Indeterminate,
}
//
impl Ratio {
    /// Per-second rate at which a counter moved
    pub fn rate(delta: u64, elapsed: Duration) -> Self {
        if elapsed.is_zero() {
            Ratio::Indeterminate
        } else {
            Ratio::Value(delta as f64 / elapsed.as_secs_f64())
        }
    }

    /// Scaled fraction active/total, e.g. the share of CPU time which was not
    /// spent idle. If time elapsed but the total did not move, nothing was
    /// active and the fraction is zero.
    pub fn fraction(active: u64, total: u64, elapsed: Duration, scale: f64)
        -> Self
    {
        if elapsed.is_zero() {
            Ratio::Indeterminate
        } else if total == 0 {
            Ratio::Value(0.0)
        } else {
            Ratio::Value(active as f64 / total as f64 * scale)
        }
    }

    /// Multiply the value (if any) by some factor, e.g. to change units
    pub fn scale(self, factor: f64) -> Self {
        match self {
            Ratio::Value(v) => Ratio::Value(v * factor),
            Ratio::Indeterminate => Ratio::Indeterminate,
        }
    }

    /// The value, if there is one
    pub fn value(&self) -> Option<f64> {
        match *self {
            Ratio::Value(v) => Some(v),
            Ratio::Indeterminate => None,
        }
    }

    /// Truth that this ratio could not be computed
    pub fn is_indeterminate(&self) -> bool {
        *self == Ratio::Indeterminate
    }
}


/// Time elapsed between two snapshots
///
/// Equal timestamps yield a zero duration. A "current" snapshot which is
/// older than the "prior" one indicates that the caller mixed them up.
///
pub fn elapsed<T>(prior: &Snapshot<T>, current: &Snapshot<T>)
    -> Result<Duration, Error>
{
    (current.timestamp - prior.timestamp).to_std().map_err(|_| {
        Error::OutOfOrder {
            prior: prior.timestamp,
            current: current.timestamp,
        }
    })
}


/// Difference between two samples of a monotonic counter
///
/// A counter which went backwards indicates a parser or scaling bug, or a
/// counter reset, and is rejected rather than silently clamped.
///
pub fn counter_delta(field: &str, prior: u64, current: u64)
    -> Result<u64, Error>
{
    current.checked_sub(prior).ok_or_else(|| {
        Error::CounterRegression { field: field.to_owned(), prior, current }
    })
}


/// Sum of several counter deltas
///
/// Counters are only bounded by the u64 grammar of the file, so a sum of
/// them may not fit in 64 bits. Such a sum is reported as an overflow of
/// `field` rather than wrapped around.
///
pub fn checked_sum(field: &str, deltas: &[u64]) -> Result<u64, Error> {
    deltas.iter()
          .try_fold(0u64, |sum, &delta| sum.checked_add(delta))
          .ok_or_else(|| Error::parse(field, ParseCause::Overflow))
}


/// Counter delta converted into some other unit (e.g. sectors to bytes),
/// with the same overflow reporting as checked_sum()
pub fn checked_scale(field: &str, delta: u64, factor: u64)
    -> Result<u64, Error>
{
    delta.checked_mul(factor)
         .ok_or_else(|| Error::parse(field, ParseCause::Overflow))
}


/// Match the entities of two snapshots positionally, and compute some
/// per-entity result for each index that is present in both of them
///
/// If the entity counts differ, an EntitySetChanged error is recorded and the
/// extra entities are ignored. The `compare` callback may also reject a pair
/// of entities (e.g. because their names differ) by returning Ok(None), in
/// which case the entity set is considered to have changed as well.
///
pub fn match_entities<E, R, F>(prior: &[E],
                               current: &[E],
                               errors: &mut Vec<Error>,
                               mut compare: F) -> Result<Vec<R>, Error>
    where F: FnMut(&E, &E) -> Result<Option<R>, Error>
{
    let mut results = Vec::with_capacity(prior.len().min(current.len()));
    let mut changed = false;
    for pair in prior.iter().zip_longest(current.iter()) {
        match pair {
            EitherOrBoth::Both(old, new) => match compare(old, new)? {
                Some(result) => results.push(result),
                None => changed = true,
            },
            EitherOrBoth::Left(_) | EitherOrBoth::Right(_) => changed = true,
        }
    }
    if changed {
        errors.push(Error::EntitySetChanged {
            prior: prior.len(),
            current: current.len(),
        });
    }
    Ok(results)
}


/// Unit tests
#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use crate::error::Error;
    use crate::snapshot::Snapshot;
    use std::time::Duration;
    use crate::error::ParseCause;
    use super::{checked_scale, checked_sum, counter_delta, elapsed,
                match_entities, Ratio, PERCENT};

    /// Check that ratios never turn into NaN or infinity
    #[test]
    fn ratio_guards() {
        assert_eq!(Ratio::rate(10, Duration::ZERO), Ratio::Indeterminate);
        assert_eq!(Ratio::rate(10, Duration::from_secs(2)), Ratio::Value(5.0));
        assert_eq!(Ratio::fraction(0, 0, Duration::ZERO, PERCENT),
                   Ratio::Indeterminate);
        assert_eq!(Ratio::fraction(0, 0, Duration::from_secs(1), PERCENT),
                   Ratio::Value(0.0));
        assert_eq!(Ratio::fraction(1, 4, Duration::from_secs(1), PERCENT),
                   Ratio::Value(25.0));
        assert_eq!(Ratio::Value(3.0).scale(0.5), Ratio::Value(1.5));
        assert_eq!(Ratio::Indeterminate.scale(2.0), Ratio::Indeterminate);
        assert!(Ratio::Indeterminate.is_indeterminate());
        assert_eq!(Ratio::Value(1.5).value(), Some(1.5));
        assert_eq!(Ratio::Indeterminate.value(), None);
    }

    /// Check that elapsed time is computed from snapshot timestamps
    #[test]
    fn elapsed_time() {
        let t0 = Snapshot::new(Utc.timestamp_opt(1000, 0).unwrap(), ());
        let t1 = Snapshot::new(Utc.timestamp_opt(1001, 500).unwrap(), ());
        assert_eq!(elapsed(&t0, &t1).unwrap(), Duration::new(1, 500));
        assert_eq!(elapsed(&t0, &t0).unwrap(), Duration::ZERO);
        assert!(matches!(elapsed(&t1, &t0), Err(Error::OutOfOrder { .. })));
    }

    /// Check that counter regressions are rejected
    #[test]
    fn counter_regression() {
        assert_eq!(counter_delta("ctxt", 3, 5).unwrap(), 2);
        assert_eq!(counter_delta("ctxt", 5, 5).unwrap(), 0);
        match counter_delta("ctxt", 5, 3) {
            Err(Error::CounterRegression { field, prior, current }) => {
                assert_eq!((field.as_str(), prior, current), ("ctxt", 5, 3));
            },
            other => panic!("Unexpected outcome {:?}", other),
        }
    }

    /// Check that sums and unit conversions of deltas never wrap around
    #[test]
    fn checked_arithmetic() {
        assert_eq!(checked_sum("cpu.total", &[1, 2, 3]).unwrap(), 6);
        assert_eq!(checked_sum("cpu.total", &[]).unwrap(), 0);
        match checked_sum("cpu.total", &[u64::MAX, 1]) {
            Err(Error::Parse { field, cause: ParseCause::Overflow }) => {
                assert_eq!(field, "cpu.total");
            },
            other => panic!("Unexpected outcome {:?}", other),
        }
        assert_eq!(checked_scale("sda.read_bytes", 3, 512).unwrap(), 1536);
        assert!(matches!(checked_scale("sda.read_bytes", u64::MAX / 2, 512),
                         Err(Error::Parse { cause: ParseCause::Overflow,
                                            .. })));
    }

    /// Check that entity matching never goes out of bounds
    #[test]
    fn entity_matching() {
        let diff = |a: &u64, b: &u64| Ok(Some(b - a));

        // Same entity set
        let mut errors = Vec::new();
        let same = match_entities(&[1, 2], &[3, 5], &mut errors, diff);
        assert_eq!(same.unwrap(), vec![2, 3]);
        assert!(errors.is_empty());

        // An entity appeared
        let grown = match_entities(&[1, 2], &[3, 5, 8], &mut errors, diff);
        assert_eq!(grown.unwrap(), vec![2, 3]);
        assert!(matches!(errors[..],
                         [Error::EntitySetChanged { prior: 2, current: 3 }]));

        // An entity disappeared
        errors.clear();
        let shrunk = match_entities(&[1, 2, 3], &[3], &mut errors, diff);
        assert_eq!(shrunk.unwrap(), vec![2]);
        assert!(matches!(errors[..],
                         [Error::EntitySetChanged { prior: 3, current: 1 }]));

        // The comparison callback rejected an entity
        errors.clear();
        let renamed = match_entities(&[1, 2], &[3, 5], &mut errors,
                                     |a: &u64, b: &u64| {
                                         Ok(if *a == 2 { None }
                                            else { Some(b - a) })
                                     });
        assert_eq!(renamed.unwrap(), vec![2]);
        assert_eq!(errors.len(), 1);
    }
}
