//! Error taxonomy of the sampling engine
//!
//! Errors come at three levels, which are handled very differently:
//!
//! - Construction errors (a pseudo-file cannot be opened) are fatal and are
//!   returned immediately to whoever tried to build a reader.
//! - I/O errors during a readout are reported for the call (on-demand path)
//!   or for the tick (sampler path), but never terminate a running sampler.
//! - Parse errors are local to a single field. The enclosing snapshot is
//!   still produced, with that field left at its zero value, and the error
//!   travels alongside it in a `Partial` outcome.

use chrono::{DateTime, Utc};
use std::io;
use std::path::PathBuf;


/// Everything that can go wrong while reading, parsing or comparing samples
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A pseudo-file could not be opened (missing file, permissions...)
    #[error("failed to open {file}: {source}", file = .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An I/O error occured while reading a pseudo-file
    #[error("failed to read {file}: {source}", file = .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A single field of a pseudo-file could not be decoded
    #[error("failed to parse {field}: {cause}")]
    Parse { field: String, cause: ParseCause },

    /// Two snapshots do not describe the same set of entities (devices,
    /// network interfaces, CPUs...), so only part of a delta is meaningful
    #[error("entity set changed between snapshots ({prior} -> {current})")]
    EntitySetChanged { prior: usize, current: usize },

    /// A monotonic counter went backwards between two snapshots
    #[error("counter {field} went backwards ({prior} -> {current})")]
    CounterRegression { field: String, prior: u64, current: u64 },

    /// The "current" snapshot was acquired before the "prior" one
    #[error("snapshots are out of order ({prior} is after {current})")]
    OutOfOrder {
        prior: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    /// Failed to encode or decode a snapshot as JSON
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to encode or decode a snapshot in binary form
    #[error("binary codec error: {0}")]
    Binary(#[from] bincode::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The sampling thread could not be spawned
    #[error("failed to spawn sampling thread: {0}")]
    Spawn(#[source] io::Error),

    /// A sampler method was called in the wrong lifecycle state
    #[error("sampler is {actual:?}, expected {expected:?}")]
    SamplerState {
        expected: crate::sampler::SamplerState,
        actual: crate::sampler::SamplerState,
    },
}
//
impl Error {
    /// Build a parse error for a named field
    pub fn parse(field: impl Into<String>, cause: ParseCause) -> Self {
        Error::Parse { field: field.into(), cause }
    }

    /// Truth that this error only affects one field of a snapshot
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }
}


/// Reason why a field failed to decode
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseCause {
    /// A non-digit byte was found inside of a numeric field
    #[error("malformed number (byte {byte:#04x} at position {position})")]
    MalformedNumber { byte: u8, position: usize },

    /// The number does not fit in its destination type
    #[error("number overflows its destination")]
    Overflow,

    /// The line is shorter than the file grammar requires
    #[error("missing field")]
    MissingField,

    /// Text which does not follow the file grammar
    #[error("unexpected text {0:?}")]
    Unexpected(String),
}


/// Best-effort outcome of a parse or delta computation
///
/// Partial results are a designed outcome of this library, not an exception:
/// a snapshot where one field failed to parse is still worth returning. So
/// callers must check `errors` even when they got a `value`.
///
#[derive(Debug)]
pub struct Partial<T> {
    /// The (possibly incomplete) result
    pub value: T,

    /// Problems encountered while building it, in order of discovery
    pub errors: Vec<Error>,
}
//
impl<T> Partial<T> {
    /// Wrap a result that was built without any problem
    pub fn complete(value: T) -> Self {
        Self { value, errors: Vec::new() }
    }

    /// Wrap a result along with the problems encountered while building it
    pub fn with_errors(value: T, errors: Vec<Error>) -> Self {
        Self { value, errors }
    }

    /// Truth that no problem was encountered
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Transform the value, keeping the error list
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Partial<U> {
        Partial { value: f(self.value), errors: self.errors }
    }

    /// Strict view: the value if complete, otherwise the first error
    pub fn into_result(self) -> Result<T, Error> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.value),
        }
    }
}
