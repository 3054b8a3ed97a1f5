//! This module defines what a pseudo-file parser is
//!
//! The textual data from a pseudo-file is not exploitable right after it has
//! been fetched from the kernel. It must be parsed back into usable numbers
//! first. And this is what a parser does: it takes the bytes of a pseudo-file
//! as input, and provides typed data as output. By nature, this operation is
//! very specific to a given pseudo-file format, aside from some basic text
//! processing building blocks (see the splitter module), so each file gets its
//! own parser.
//!
//! Parsers dispatch on the key of each record using byte-slice patterns, which
//! means that no key string ever gets built and no map gets consulted on the
//! sampling path. Pseudo-file keys are a small and fixed vocabulary, so this
//! is both fast and easy to read.
//!
//! Parsers are also expected to be forgiving: keys which they do not know
//! about are skipped (newer kernels add records all the time), and a field
//! which fails to decode is reported and left at its zero value without
//! preventing the rest of the file from being parsed.

use crate::error::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;


/// Interface contract which must be met by a pseudo-file parser
pub trait PseudoFileParser: Default + Send + 'static {
    /// Typed contents of the pseudo-file
    type Data: Clone + Debug + Default + PartialEq + Serialize
               + DeserializeOwned + Send + 'static;

    /// Location of the pseudo-file, relative to the procfs mount point
    const PATH: &'static str;

    /// Parse the contents of the pseudo-file
    ///
    /// Problems with individual fields are pushed into `errors`, and the
    /// associated members of the output are left at their zero value.
    ///
    fn parse(&mut self, contents: &[u8], errors: &mut Vec<Error>)
        -> Self::Data;
}


/// INTERNAL: Parse a field, storing the result in `target` or reporting the
///           failure in `errors` (in which case `target` is left untouched)
pub(crate) fn parse_into<T>(target: &mut T,
                            field: &str,
                            result: Result<T, crate::error::ParseCause>,
                            errors: &mut Vec<Error>) {
    match result {
        Ok(value) => *target = value,
        Err(cause) => errors.push(Error::parse(field, cause)),
    }
}
